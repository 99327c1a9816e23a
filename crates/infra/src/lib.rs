//! Infrastructure layer: event stores, configuration and the process runtime.
//!
//! - `event_store`: the append-only store trait, in-memory and Postgres
//!   backends, and the effect-returning [`EventStoreHandle`]
//! - `runtime`: replay-based event delivery ([`ProcessRuntime`])
//! - `retry`: backoff policy for optimistic-concurrency conflicts
//! - `config`: environment-driven [`RuntimeConfig`]

pub mod config;
pub mod event_store;
pub mod retry;
pub mod runtime;


pub use config::{ConfigError, RuntimeConfig};
pub use event_store::{
    EventStore, EventStoreError, EventStoreHandle, InMemoryEventStore, PostgresEventStore, StoreBackend,
    create_event_store,
};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use runtime::{ProcessRuntime, RuntimeError, apply_history};
