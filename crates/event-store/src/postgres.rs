use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventStoreError, Result, Snapshot, Version,
    store::{AppendOptions, EventStore, EventStream, validate_events_for_append},
};

/// PostgreSQL-backed event log.
///
/// Version assignment is enforced by the `unique_stream_version`
/// constraint: two writers racing for the same version slot cannot both
/// commit, regardless of what they read beforehand.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the event and snapshot tables if they do not exist.
    pub async fn create_schema(&self) -> Result<()> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                sequence BIGSERIAL PRIMARY KEY,
                id UUID NOT NULL UNIQUE,
                event_type TEXT NOT NULL,
                aggregate_id UUID NOT NULL,
                aggregate_type TEXT NOT NULL,
                version BIGINT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                payload JSONB NOT NULL,
                metadata JSONB NOT NULL,
                CONSTRAINT unique_stream_version
                    UNIQUE (aggregate_id, aggregate_type, version)
            );

            CREATE INDEX IF NOT EXISTS idx_events_stream
                ON events (aggregate_id, aggregate_type);

            CREATE TABLE IF NOT EXISTS snapshots (
                aggregate_id UUID NOT NULL,
                aggregate_type TEXT NOT NULL,
                version BIGINT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                state JSONB NOT NULL,
                PRIMARY KEY (aggregate_id, aggregate_type)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            timestamp: row.try_get("timestamp")?,
            payload: row.try_get("payload")?,
            metadata,
        })
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        validate_events_for_append(&events).map_err(|e| {
            EventStoreError::Serialization(serde_json::Error::io(std::io::Error::other(e.message)))
        })?;

        let aggregate_id = events[0].aggregate_id;
        let aggregate_type = events[0].aggregate_type.clone();

        let mut tx = self.pool.begin().await?;

        // Drop events already recorded under the same id (retried save).
        let ids: Vec<Uuid> = events.iter().map(|e| e.event_id.as_uuid()).collect();
        let existing: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM events WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await?;
        let fresh: Vec<_> = events
            .into_iter()
            .filter(|e| !existing.contains(&e.event_id.as_uuid()))
            .collect();

        let current_version: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(version) FROM events WHERE aggregate_id = $1 AND aggregate_type = $2",
        )
        .bind(aggregate_id.as_uuid())
        .bind(&aggregate_type)
        .fetch_one(&mut *tx)
        .await?;
        let current_version = Version::new(current_version.unwrap_or(0));

        if fresh.is_empty() {
            tx.commit().await?;
            return Ok(current_version);
        }

        if let Some(expected) = options.expected_version
            && current_version != expected
        {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual: current_version,
            });
        }

        // The unique constraint is the authority on version claims; the
        // read above only gives an early, friendlier failure.
        let mut last_version = Version::initial();
        for event in &fresh {
            let metadata_json = serde_json::to_value(&event.metadata)?;

            sqlx::query(
                r#"
                INSERT INTO events (id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(&event.event_type)
            .bind(event.aggregate_id.as_uuid())
            .bind(&event.aggregate_type)
            .bind(event.version.as_i64())
            .bind(event.timestamp)
            .bind(&event.payload)
            .bind(metadata_json)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_stream_version")
                {
                    return EventStoreError::ConcurrencyConflict {
                        aggregate_id,
                        expected: options.expected_version.unwrap_or(Version::initial()),
                        actual: event.version,
                    };
                }
                EventStoreError::Database(e)
            })?;

            last_version = event.version;
        }

        let appended = fresh.len() as u64;
        tx.commit().await?;

        metrics::counter!("event_store.events_appended").increment(appended);
        tracing::debug!(%aggregate_id, %aggregate_type, count = appended, "appended events");

        Ok(last_version)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
    ) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            "SELECT id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata \
             FROM events \
             WHERE aggregate_id = $1 AND aggregate_type = $2 \
             ORDER BY version ASC",
        )
        .bind(aggregate_id.as_uuid())
        .bind(aggregate_type)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn get_events_for_aggregate_after(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        after_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            "SELECT id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata \
             FROM events \
             WHERE aggregate_id = $1 AND aggregate_type = $2 AND version > $3 \
             ORDER BY version ASC",
        )
        .bind(aggregate_id.as_uuid())
        .bind(aggregate_type)
        .bind(after_version.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::StreamExt;

        // The SQL must be a literal: the returned stream keeps borrowing it.
        let stream = sqlx::query(
            "SELECT id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata \
             FROM events ORDER BY sequence ASC",
        )
        .fetch(&self.pool)
        .map(|result| match result {
            Ok(row) => Self::row_to_event(row),
            Err(e) => Err(EventStoreError::Database(e)),
        });

        Ok(Box::pin(stream))
    }

    async fn get_aggregate_version(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
    ) -> Result<Option<Version>> {
        let version: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(version) FROM events WHERE aggregate_id = $1 AND aggregate_type = $2",
        )
        .bind(aggregate_id.as_uuid())
        .bind(aggregate_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(version.map(Version::new))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (aggregate_id, aggregate_type, version, timestamp, state)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (aggregate_id, aggregate_type) DO UPDATE SET
                version = EXCLUDED.version,
                timestamp = EXCLUDED.timestamp,
                state = EXCLUDED.state
            "#,
        )
        .bind(snapshot.aggregate_id.as_uuid())
        .bind(&snapshot.aggregate_type)
        .bind(snapshot.version.as_i64())
        .bind(snapshot.timestamp)
        .bind(&snapshot.state)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_snapshot(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
    ) -> Result<Option<Snapshot>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT aggregate_id, aggregate_type, version, timestamp, state
            FROM snapshots
            WHERE aggregate_id = $1 AND aggregate_type = $2
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .bind(aggregate_type)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Snapshot {
                aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
                aggregate_type: row.try_get("aggregate_type")?,
                version: Version::new(row.try_get("version")?),
                timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
                state: row.try_get("state")?,
            })),
            None => Ok(None),
        }
    }
}
