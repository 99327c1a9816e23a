//! `procflow-core`: foundation building blocks for the process engine.
//!
//! This crate contains the pieces every other layer leans on: the deferred
//! [`Effect`] type, the result vocabulary used by event interpreters, instance
//! identity and the marker trait for values carried through process state.
//! No storage or runtime concerns live here.

pub mod data;
pub mod effect;
pub mod error;
pub mod id;
pub mod result;

pub use data::ProcessData;
pub use effect::Effect;
pub use error::{EffectError, IdError};
pub use id::{InstanceId, ProcessInstance};
pub use result::{ResultExt, StepResult};
