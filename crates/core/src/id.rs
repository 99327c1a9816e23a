//! Process instance identity.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IdError;

/// Identity of a running process instance.
///
/// The runtime never inspects identities beyond this trait; any type that can
/// name the process it belongs to can address instances. The process name
/// scopes mediator commands (`"{process_name}.enqueueEvent"`).
pub trait ProcessInstance: Clone + Send + Sync + 'static {
    /// Name of the process definition this instance runs.
    fn process_name(&self) -> &str;
}

/// Default instance identity: a process name plus an instance key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId {
    process_name: String,
    key: String,
}

impl InstanceId {
    /// Create an identity with a fresh key.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer [`InstanceId::with_key`] in tests
    /// for determinism.
    pub fn new(process_name: impl Into<String>) -> Self {
        Self {
            process_name: process_name.into(),
            key: Uuid::now_v7().to_string(),
        }
    }

    pub fn with_key(process_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            process_name: process_name.into(),
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Conventional stream name for this instance: `"{process}-{key}"`.
    pub fn stream_name(&self) -> String {
        format!("{}-{}", self.process_name, self.key)
    }
}

impl ProcessInstance for InstanceId {
    fn process_name(&self) -> &str {
        &self.process_name
    }
}

impl core::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.process_name, self.key)
    }
}

impl FromStr for InstanceId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (process_name, key) = s
            .split_once('/')
            .ok_or_else(|| IdError::Malformed(s.to_string()))?;
        if process_name.is_empty() {
            return Err(IdError::Empty("process name"));
        }
        if key.is_empty() {
            return Err(IdError::Empty("key"));
        }
        Ok(Self::with_key(process_name, key))
    }
}
