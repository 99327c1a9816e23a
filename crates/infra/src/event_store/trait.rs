use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Event store operation error.
///
/// These are **infrastructure errors** (storage, concurrency, encoding) as
/// opposed to domain failures, which a process reports through
/// `ProcessState::Failed` and never through an error.
///
/// ## Error Categories
///
/// - **Concurrency**: optimistic concurrency check failed (version mismatch).
///   This is a retry signal, not a fault.
/// - **Serialization**: an entry could not be encoded or decoded
/// - **Database**: the backing store failed (connection, query, transaction)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    /// `actual` is the version the store observed. When the conflict is
    /// detected by a unique index rather than by the version check it is a
    /// lower bound.
    #[error(
        "optimistic concurrency check failed on stream '{stream}': expected version {expected}, found {actual}"
    )]
    Concurrency {
        stream: String,
        expected: u64,
        actual: u64,
    },

    #[error("entry serialization failed: {0}")]
    Serialization(String),

    #[error("database error: {0}")]
    Database(String),
}

impl EventStoreError {
    pub fn is_concurrency(&self) -> bool {
        matches!(self, Self::Concurrency { .. })
    }
}

/// Append-only store of process streams.
///
/// A stream is an ordered list of entries addressed by a string key. The
/// version of a stream is its entry count; the first entry has version 1 and a
/// stream that was never written to has version 0.
///
/// ## Append Semantics
///
/// `append()`:
/// - checks optimistic concurrency: the current version must equal
///   `expected_version`, otherwise `EventStoreError::Concurrency`
/// - assigns versions `expected_version + 1 ..= expected_version + n`
/// - persists the batch atomically (all entries or none)
/// - returns the new stream version
///
/// ## Load Semantics
///
/// `load_stream()`:
/// - returns entries in version order
/// - returns an empty vector if the stream doesn't exist
/// - with `Some(v)`, returns only entries whose version is greater than `v`
///
/// ## Implementation Requirements
///
/// Implementations must serialise check-then-append per stream so that two
/// appends with the same `expected_version` cannot both succeed. Different
/// streams share nothing and need no coordination.
#[async_trait]
pub trait EventStore<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    async fn append(
        &self,
        stream: &str,
        entries: Vec<T>,
        expected_version: u64,
    ) -> Result<u64, EventStoreError>;

    async fn load_stream(
        &self,
        stream: &str,
        from_version: Option<u64>,
    ) -> Result<Vec<T>, EventStoreError>;

    /// `true` once the stream holds at least one entry.
    async fn stream_exists(&self, stream: &str) -> Result<bool, EventStoreError>;

    /// Remove the stream and all its entries. Deleting a missing stream is a no-op.
    async fn delete_stream(&self, stream: &str) -> Result<(), EventStoreError>;
}

#[async_trait]
impl<T, S> EventStore<T> for Arc<S>
where
    T: Send + Sync + 'static,
    S: EventStore<T> + ?Sized,
{
    async fn append(
        &self,
        stream: &str,
        entries: Vec<T>,
        expected_version: u64,
    ) -> Result<u64, EventStoreError> {
        (**self).append(stream, entries, expected_version).await
    }

    async fn load_stream(
        &self,
        stream: &str,
        from_version: Option<u64>,
    ) -> Result<Vec<T>, EventStoreError> {
        (**self).load_stream(stream, from_version).await
    }

    async fn stream_exists(&self, stream: &str) -> Result<bool, EventStoreError> {
        (**self).stream_exists(stream).await
    }

    async fn delete_stream(&self, stream: &str) -> Result<(), EventStoreError> {
        (**self).delete_stream(stream).await
    }
}
