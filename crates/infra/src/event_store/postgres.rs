//! Postgres-backed event store implementation.
//!
//! One row per stream entry in `process_events`, keyed by
//! `(stream_id, stream_version)`. The entry itself is stored as JSON; the
//! `entry_type` column holds the tag of the carried domain event (or of the
//! entry when it carries none) so streams can be inspected with plain SQL.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `EventStoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | EventStoreError | Scenario |
//! |------------|----------------------|-----------------|----------|
//! | Database (unique violation) | `23505` | `Concurrency` | Concurrent append took the same `stream_version` |
//! | Database (other) | Any other | `Database` | Constraint, syntax, permission errors |
//! | PoolClosed | N/A | `Database` | Connection pool was closed |
//! | Other | N/A | `Database` | Network errors, connection failures, etc. |
//!
//! ## Thread Safety
//!
//! `PostgresEventStore` is `Send + Sync` and can be shared across threads.
//! All operations use the SQLx connection pool which handles thread-safe connection management.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use super::r#trait::{EventStore, EventStoreError};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS process_events (
    entry_id        UUID        NOT NULL,
    stream_id       TEXT        NOT NULL,
    stream_version  BIGINT      NOT NULL CHECK (stream_version > 0),
    entry_type      TEXT        NOT NULL,
    payload         JSONB       NOT NULL,
    recorded_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (stream_id, stream_version)
)
"#;

/// Postgres-backed append-only event store.
///
/// ## Optimistic Concurrency
///
/// The `append()` method uses a transaction to:
/// 1. Read the current stream version (`MAX(stream_version)`)
/// 2. Validate it matches `expected_version`
/// 3. Insert the new entries
///
/// If another transaction commits between steps 1 and 3, the primary key on
/// `(stream_id, stream_version)` makes the insert fail, which is reported as a
/// concurrency error as well.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
}

impl PostgresEventStore {
    /// Create a new PostgresEventStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the `process_events` table if it does not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), EventStoreError> {
        sqlx::query(CREATE_TABLE)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    /// Rows of a stream, oldest first, including storage metadata.
    #[instrument(skip(self), fields(entry_count = tracing::field::Empty), err)]
    pub async fn load_records(
        &self,
        stream: &str,
        from_version: Option<u64>,
    ) -> Result<Vec<StoredRecord>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                entry_id,
                stream_id,
                stream_version,
                entry_type,
                payload,
                recorded_at
            FROM process_events
            WHERE stream_id = $1 AND stream_version > $2
            ORDER BY stream_version ASC
            "#,
        )
        .bind(stream)
        .bind(version_param(from_version.unwrap_or(0))?)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stream", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let record = <StoredRecordRow as sqlx::FromRow<'_, sqlx::postgres::PgRow>>::from_row(&row)
                .map_err(|e| EventStoreError::Database(format!("failed to read entry row: {e}")))?;
            records.push(StoredRecord::from(record));
        }

        Span::current().record("entry_count", records.len());
        Ok(records)
    }
}

/// A persisted entry with the metadata the store keeps next to it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub entry_id: Uuid,
    pub stream: String,
    pub version: u64,
    pub entry_type: String,
    pub payload: JsonValue,
    pub recorded_at: DateTime<Utc>,
}

/// Tag stored in `entry_type`: the carried event's `type`, else the entry's
/// own `type`, else `"Unknown"`.
pub fn entry_tag(payload: &JsonValue) -> String {
    payload
        .get("event")
        .and_then(|event| event.get("type"))
        .and_then(JsonValue::as_str)
        .or_else(|| payload.get("type").and_then(JsonValue::as_str))
        .unwrap_or("Unknown")
        .to_string()
}

fn version_param(version: u64) -> Result<i64, EventStoreError> {
    i64::try_from(version)
        .map_err(|_| EventStoreError::Database(format!("stream version {version} out of range")))
}

/// Read the current version of a stream inside `tx` (0 when it has no rows).
async fn current_version(
    tx: &mut Transaction<'_, Postgres>,
    stream: &str,
) -> Result<u64, EventStoreError> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(MAX(stream_version), 0) AS current_version
        FROM process_events
        WHERE stream_id = $1
        "#,
    )
    .bind(stream)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("current_version", e))?;

    let current: i64 = row
        .try_get("current_version")
        .map_err(|e| EventStoreError::Database(format!("failed to read current_version: {e}")))?;
    Ok(current.max(0) as u64)
}

/// Map SQLx errors to EventStoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => EventStoreError::Database(format!(
            "database error in {operation}: {}",
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            EventStoreError::Database(format!("connection pool closed in {operation}"))
        }
        _ => EventStoreError::Database(format!("sqlx error in {operation}: {err}")),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

// SQLx row types

#[derive(Debug)]
struct StoredRecordRow {
    entry_id: Uuid,
    stream_id: String,
    stream_version: i64,
    entry_type: String,
    payload: JsonValue,
    recorded_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredRecordRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredRecordRow {
            entry_id: row.try_get("entry_id")?,
            stream_id: row.try_get("stream_id")?,
            stream_version: row.try_get("stream_version")?,
            entry_type: row.try_get("entry_type")?,
            payload: row.try_get("payload")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }
}

impl From<StoredRecordRow> for StoredRecord {
    fn from(row: StoredRecordRow) -> Self {
        StoredRecord {
            entry_id: row.entry_id,
            stream: row.stream_id,
            version: row.stream_version.max(0) as u64,
            entry_type: row.entry_type,
            payload: row.payload,
            recorded_at: row.recorded_at,
        }
    }
}

// Implement EventStore trait

#[async_trait]
impl<T> EventStore<T> for PostgresEventStore
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    #[instrument(skip(self, entries), fields(entry_count = entries.len()), err)]
    async fn append(
        &self,
        stream: &str,
        entries: Vec<T>,
        expected_version: u64,
    ) -> Result<u64, EventStoreError> {
        let payloads = entries
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EventStoreError::Serialization(e.to_string()))?;

        // Use a transaction for atomicity
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = current_version(&mut tx, stream).await?;
        if current != expected_version {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(EventStoreError::Concurrency {
                stream: stream.to_string(),
                expected: expected_version,
                actual: current,
            });
        }

        let mut version = current;
        for payload in payloads {
            version += 1;
            sqlx::query(
                r#"
                INSERT INTO process_events (
                    entry_id,
                    stream_id,
                    stream_version,
                    entry_type,
                    payload,
                    recorded_at
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::now_v7())
            .bind(stream)
            .bind(version_param(version)?)
            .bind(entry_tag(&payload))
            .bind(&payload)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                // Another transaction committed this version after our check.
                if is_unique_violation(&e) {
                    EventStoreError::Concurrency {
                        stream: stream.to_string(),
                        expected: expected_version,
                        actual: version,
                    }
                } else {
                    map_sqlx_error("insert_entry", e)
                }
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(version)
    }

    #[instrument(skip(self), err)]
    async fn load_stream(
        &self,
        stream: &str,
        from_version: Option<u64>,
    ) -> Result<Vec<T>, EventStoreError> {
        self.load_records(stream, from_version)
            .await?
            .into_iter()
            .map(|record| {
                serde_json::from_value(record.payload).map_err(|e| {
                    EventStoreError::Serialization(format!(
                        "entry {} of stream '{}': {e}",
                        record.version, record.stream
                    ))
                })
            })
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn stream_exists(&self, stream: &str) -> Result<bool, EventStoreError> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM process_events WHERE stream_id = $1) AS present",
        )
        .bind(stream)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stream_exists", e))?;

        row.try_get("present")
            .map_err(|e| EventStoreError::Database(format!("failed to read stream_exists: {e}")))
    }

    #[instrument(skip(self), fields(deleted_rows = tracing::field::Empty), err)]
    async fn delete_stream(&self, stream: &str) -> Result<(), EventStoreError> {
        let result = sqlx::query("DELETE FROM process_events WHERE stream_id = $1")
            .bind(stream)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_stream", e))?;

        Span::current().record("deleted_rows", result.rows_affected());
        Ok(())
    }
}
