use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventStoreError, OutboxId, OutboxMessage, Result,
    Version,
    store::{Commit, EventStore, check_stream_version, validate_commit},
};

/// Advisory lock key taken by every commit so global positions are handed
/// out in commit order.
const COMMIT_LOCK_KEY: i64 = 0x0F17_F111;

/// PostgreSQL-backed event store.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
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
            position: row.try_get("sequence")?,
            timestamp: row.try_get("timestamp")?,
            payload: row.try_get("payload")?,
            metadata,
        })
    }

    fn row_to_outbox(row: PgRow) -> Result<OutboxMessage> {
        let attempts: i32 = row.try_get("attempts")?;
        Ok(OutboxMessage {
            id: OutboxId::from_uuid(row.try_get::<Uuid, _>("id")?),
            topic: row.try_get("topic")?,
            key: row.try_get("message_key")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            attempts: attempts.max(0) as u32,
            last_error: row.try_get("last_error")?,
        })
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(skip(self, commit), fields(streams = commit.streams.len(), outbox = commit.outbox.len()))]
    async fn commit(&self, commit: Commit) -> Result<Vec<Version>> {
        validate_commit(&commit)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(COMMIT_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        for stream in &commit.streams {
            let first = &stream.events[0];
            let current: Option<i64> =
                sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                    .bind(first.aggregate_id.as_uuid())
                    .fetch_one(&mut *tx)
                    .await?;
            let current = Version::new(current.unwrap_or(0));
            check_stream_version(first.aggregate_id, current, first.version, stream.options)?;
        }

        let mut new_versions = Vec::with_capacity(commit.streams.len());
        for stream in &commit.streams {
            let mut last_version = Version::initial();
            for event in &stream.events {
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
                        && db_err.constraint() == Some("unique_aggregate_version")
                    {
                        return EventStoreError::ConcurrencyConflict {
                            aggregate_id: event.aggregate_id,
                            expected: stream.options.expected_version.unwrap_or(Version::initial()),
                            actual: event.version,
                        };
                    }
                    EventStoreError::Database(e)
                })?;

                last_version = event.version;
            }
            new_versions.push(last_version);
        }

        for message in &commit.outbox {
            sqlx::query(
                r#"
                INSERT INTO outbox (id, topic, message_key, payload, created_at, attempts, last_error)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(message.id.as_uuid())
            .bind(&message.topic)
            .bind(&message.key)
            .bind(&message.payload)
            .bind(message.created_at)
            .bind(message.attempts as i32)
            .bind(&message.last_error)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        metrics::counter!("event_store_events_committed_total")
            .increment(commit.event_count() as u64);
        Ok(new_versions)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata
            FROM events
            WHERE aggregate_id = $1
            ORDER BY version ASC
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn read_all_from(&self, after: i64, limit: usize) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata
            FROM events
            WHERE sequence > $1
            ORDER BY sequence ASC
            LIMIT $2
            "#,
        )
        .bind(after)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;

        Ok(version.map(Version::new))
    }

    async fn pending_outbox(
        &self,
        limit: usize,
        max_attempts: u32,
    ) -> Result<Vec<OutboxMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, topic, message_key, payload, created_at, attempts, last_error
            FROM outbox
            WHERE delivered_at IS NULL AND attempts < $1
            ORDER BY sequence ASC
            LIMIT $2
            "#,
        )
        .bind(max_attempts as i32)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_outbox).collect()
    }

    async fn mark_outbox_delivered(&self, id: OutboxId) -> Result<()> {
        let result = sqlx::query("UPDATE outbox SET delivered_at = NOW() WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(EventStoreError::OutboxMessageNotFound(id));
        }
        Ok(())
    }

    async fn record_outbox_failure(&self, id: OutboxId, error: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE outbox SET attempts = attempts + 1, last_error = $2 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(error)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(EventStoreError::OutboxMessageNotFound(id));
        }
        Ok(())
    }

    async fn purge_delivered_outbox(&self, delivered_before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM outbox WHERE delivered_at IS NOT NULL AND delivered_at < $1",
        )
        .bind(delivered_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
