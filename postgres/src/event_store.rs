//! `PostgreSQL`-backed implementation of [`EventStore`].
//!
//! Events are stored in a single `events` table, one row per event, with a
//! unique `(stream_id, version)` constraint providing optimistic concurrency:
//! an `INSERT` that violates the constraint means another writer already
//! appended at that version, and is mapped to `EventStoreError::ConcurrencyConflict`.
//!
//! ```sql
//! CREATE TABLE events (
//!     stream_id   TEXT NOT NULL,
//!     version     BIGINT NOT NULL,
//!     event_type  TEXT NOT NULL,
//!     data        BYTEA NOT NULL,
//!     metadata    JSONB,
//!     recorded_at TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     PRIMARY KEY (stream_id, version)
//! );
//!
//! CREATE TABLE snapshots (
//!     stream_id TEXT PRIMARY KEY,
//!     version   BIGINT NOT NULL,
//!     state     BYTEA NOT NULL,
//!     saved_at  TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! ```

use composable_rust_core::event::SerializedEvent;
use composable_rust_core::event_store::{EventStore, EventStoreError};
use composable_rust_core::stream::{StreamId, Version};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::future::Future;
use std::pin::Pin;

/// `PostgreSQL` event store.
///
/// Uses runtime-checked queries (`sqlx::query`/`query_as`, not the `query!`
/// macros) so the crate builds without a live database connection or an
/// `sqlx` offline query cache.
#[derive(Clone, Debug)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Connect to `database_url` with a small bounded pool.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::DatabaseError`] if the connection cannot be established.
    pub async fn new(database_url: &str) -> Result<Self, EventStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Wrap an already-constructed pool (for sharing one pool across
    /// `EventStore`, `DeadLetterQueue`, and projection stores).
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the event and snapshot table migrations.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::DatabaseError`] if any statement fails.
    pub async fn migrate(&self) -> Result<(), EventStoreError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS events (
                stream_id   TEXT NOT NULL,
                version     BIGINT NOT NULL,
                event_type  TEXT NOT NULL,
                data        BYTEA NOT NULL,
                metadata    JSONB,
                recorded_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (stream_id, version)
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS snapshots (
                stream_id TEXT PRIMARY KEY,
                version   BIGINT NOT NULL,
                state     BYTEA NOT NULL,
                saved_at  TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}

#[allow(clippy::cast_possible_wrap)] // stream versions never approach i64::MAX
impl EventStore for PostgresEventStore {
    fn append_events(
        &self,
        stream_id: StreamId,
        expected_version: Option<Version>,
        events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

            let row: Option<(i64,)> =
                sqlx::query_as("SELECT MAX(version) FROM events WHERE stream_id = $1")
                    .bind(stream_id.as_str())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
            let current_version = Version::new(row.and_then(|(v,)| u64::try_from(v).ok()).unwrap_or(0));

            if let Some(expected) = expected_version {
                if expected != current_version {
                    return Err(EventStoreError::ConcurrencyConflict {
                        stream_id,
                        expected,
                        actual: current_version,
                    });
                }
            }

            let mut next_version = current_version;
            for event in events {
                next_version = next_version.next();
                let result = sqlx::query(
                    r"
                    INSERT INTO events (stream_id, version, event_type, data, metadata)
                    VALUES ($1, $2, $3, $4, $5)
                    ",
                )
                .bind(stream_id.as_str())
                .bind(next_version.value() as i64)
                .bind(&event.event_type)
                .bind(&event.data)
                .bind(event.metadata.clone())
                .execute(&mut *tx)
                .await;

                if let Err(sqlx::Error::Database(db_err)) = &result {
                    if db_err.is_unique_violation() {
                        return Err(EventStoreError::ConcurrencyConflict {
                            stream_id,
                            expected: expected_version.unwrap_or(current_version),
                            actual: current_version,
                        });
                    }
                }
                result.map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
            }

            tx.commit()
                .await
                .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

            Ok(next_version)
        })
    }

    fn load_events(
        &self,
        stream_id: StreamId,
        from_version: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SerializedEvent>, EventStoreError>> + Send + '_>>
    {
        Box::pin(async move {
            let from = from_version.map_or(0_i64, |v| v.value() as i64);
            let rows = sqlx::query(
                r"
                SELECT event_type, data, metadata
                FROM events
                WHERE stream_id = $1 AND version >= $2
                ORDER BY version ASC
                ",
            )
            .bind(stream_id.as_str())
            .bind(from)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

            Ok(rows
                .into_iter()
                .map(|row| {
                    let metadata: Option<serde_json::Value> = row.get("metadata");
                    SerializedEvent::new(row.get("event_type"), row.get("data"), metadata)
                })
                .collect())
        })
    }

    fn save_snapshot(
        &self,
        stream_id: StreamId,
        version: Version,
        state: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO snapshots (stream_id, version, state, saved_at)
                VALUES ($1, $2, $3, now())
                ON CONFLICT (stream_id)
                DO UPDATE SET version = EXCLUDED.version, state = EXCLUDED.state, saved_at = now()
                ",
            )
            .bind(stream_id.as_str())
            .bind(version.value() as i64)
            .bind(&state)
            .execute(&self.pool)
            .await
            .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

            Ok(())
        })
    }

    fn load_snapshot(
        &self,
        stream_id: StreamId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<(Version, Vec<u8>)>, EventStoreError>> + Send + '_>>
    {
        Box::pin(async move {
            let row: Option<(i64, Vec<u8>)> =
                sqlx::query_as("SELECT version, state FROM snapshots WHERE stream_id = $1")
                    .bind(stream_id.as_str())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

            Ok(row.map(|(version, state)| {
                (Version::new(u64::try_from(version).unwrap_or(0)), state)
            }))
        })
    }
}
