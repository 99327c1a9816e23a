//! Error model for the foundation layer.
//!
//! Effects carry `anyhow::Error` because they wrap arbitrary user work. The
//! variants here are the failures the core combinators raise themselves;
//! callers recover them with `anyhow::Error::downcast_ref`.

use thiserror::Error;

/// Failure raised by an [`Effect`](crate::Effect) combinator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EffectError {
    /// `Effect::race` was given no effects to race.
    #[error("race over an empty list of effects")]
    EmptyRace,

    /// An effect built with `Effect::fail` from a plain message.
    #[error("{0}")]
    Failed(String),
}

impl EffectError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// An instance identifier could not be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("invalid instance id '{0}': expected '<process>/<key>'")]
    Malformed(String),

    #[error("invalid instance id: empty {0}")]
    Empty(&'static str),
}
