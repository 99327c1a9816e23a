//! Process algebra: long-running, event-driven workflows as pure values.
//!
//! A [`Process`] is a function from `(instance, state)` to a [`Transition`]:
//! the effect to run now plus the [`ProcessState`] the workflow is in
//! afterwards. A suspended workflow is an `InProgress` node holding the
//! function that consumes its next event, so suspension needs no threads,
//! timers or serialised continuations. Replaying the persisted events through
//! those functions rebuilds the exact node again.
//!
//! - `state`: the process state tree and its combinators
//! - `process`: process constructors and composition
//! - `sequence`: fluent builder plus the `process_do!`/`process_pipe!` macros
//! - `entry`: what a process stream stores
//! - `mediator`, `command`: process-scoped command routing for follow-up events
//!
//! Nothing here performs IO. Persistence and the replay loop live in
//! `procflow-infra`.

pub mod command;
pub mod entry;
pub mod mediator;
pub mod process;
pub mod sequence;
pub mod state;

pub use command::{Command, EnqueueEvent};
pub use entry::StreamEntry;
pub use mediator::{EventMediator, Mediator};
pub use process::Process;
pub use sequence::Sequence;
pub use state::{Next, ProcessState, ProcessStateKind, Transition};

pub use procflow_core::{Effect, InstanceId, ProcessData, ProcessInstance, StepResult};
