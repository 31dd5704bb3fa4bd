use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, OutboxId, OutboxMessage, Result, Version,
    store::{Commit, EventStore, check_stream_version, validate_commit},
};

#[derive(Debug, Clone)]
struct OutboxEntry {
    message: OutboxMessage,
    delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Global log; an event's position is its index + 1.
    events: Vec<EventEnvelope>,
    versions: HashMap<AggregateId, Version>,
    outbox: Vec<OutboxEntry>,
}

/// In-memory event store for tests and single-process deployments.
///
/// A commit holds the write lock from version check to append, which gives
/// the same all-or-nothing behavior as the PostgreSQL transaction.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }

    /// Returns the number of outbox messages not yet delivered.
    pub async fn undelivered_count(&self) -> usize {
        self.state
            .read()
            .await
            .outbox
            .iter()
            .filter(|e| e.delivered_at.is_none())
            .count()
    }

    /// Returns every outbox message still held, delivered or not.
    pub async fn outbox_messages(&self) -> Vec<OutboxMessage> {
        self.state
            .read()
            .await
            .outbox
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }

    /// Clears all events and outbox messages.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        *state = MemoryState::default();
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn commit(&self, commit: Commit) -> Result<Vec<Version>> {
        validate_commit(&commit)?;

        let mut state = self.state.write().await;

        // Check every stream before touching anything.
        for stream in &commit.streams {
            let first = &stream.events[0];
            let current = state
                .versions
                .get(&first.aggregate_id)
                .copied()
                .unwrap_or(Version::initial());
            check_stream_version(first.aggregate_id, current, first.version, stream.options)?;
        }

        let mut new_versions = Vec::with_capacity(commit.streams.len());
        for stream in commit.streams {
            let Some(last) = stream.events.last() else {
                continue;
            };
            let aggregate_id = last.aggregate_id;
            let last_version = last.version;

            for mut event in stream.events {
                event.position = state.events.len() as i64 + 1;
                state.events.push(event);
            }
            state.versions.insert(aggregate_id, last_version);
            new_versions.push(last_version);
        }

        state
            .outbox
            .extend(commit.outbox.into_iter().map(|message| OutboxEntry {
                message,
                delivered_at: None,
            }));

        Ok(new_versions)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }

    async fn read_all_from(&self, after: i64, limit: usize) -> Result<Vec<EventEnvelope>> {
        let state = self.state.read().await;
        let start = after.max(0) as usize;
        Ok(state
            .events
            .iter()
            .skip(start)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        Ok(self.state.read().await.versions.get(&aggregate_id).copied())
    }

    async fn pending_outbox(
        &self,
        limit: usize,
        max_attempts: u32,
    ) -> Result<Vec<OutboxMessage>> {
        let state = self.state.read().await;
        Ok(state
            .outbox
            .iter()
            .filter(|e| e.delivered_at.is_none() && e.message.attempts < max_attempts)
            .take(limit)
            .map(|e| e.message.clone())
            .collect())
    }

    async fn mark_outbox_delivered(&self, id: OutboxId) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .outbox
            .iter_mut()
            .find(|e| e.message.id == id)
            .ok_or(EventStoreError::OutboxMessageNotFound(id))?;
        entry.delivered_at = Some(Utc::now());
        Ok(())
    }

    async fn record_outbox_failure(&self, id: OutboxId, error: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .outbox
            .iter_mut()
            .find(|e| e.message.id == id)
            .ok_or(EventStoreError::OutboxMessageNotFound(id))?;
        entry.message.attempts += 1;
        entry.message.last_error = Some(error.to_string());
        Ok(())
    }

    async fn purge_delivered_outbox(&self, delivered_before: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.outbox.len();
        state
            .outbox
            .retain(|e| !e.delivered_at.is_some_and(|at| at < delivered_before));
        Ok((before - state.outbox.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AppendOptions, EventStoreExt};

    fn create_test_event(
        aggregate_id: AggregateId,
        version: Version,
        event_type: &str,
    ) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("TestAggregate")
            .event_type(event_type)
            .version(version)
            .payload_raw(serde_json::json!({"test": true}))
            .build()
            .unwrap()
    }

    fn message(topic: &str) -> OutboxMessage {
        OutboxMessage::new(topic, "key", serde_json::json!({"n": 1}))
    }

    #[tokio::test]
    async fn append_single_event() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();
        let event = create_test_event(aggregate_id, Version::first(), "TestEvent");

        let version = store
            .append(vec![event], AppendOptions::expect_new())
            .await
            .unwrap();
        assert_eq!(version, Version::first());

        let events = store.get_events_for_aggregate(aggregate_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].position, 1);
    }

    #[tokio::test]
    async fn concurrency_conflict_on_wrong_version() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();

        store
            .append(
                vec![create_test_event(aggregate_id, Version::first(), "Event1")],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();

        let result = store
            .append(
                vec![create_test_event(aggregate_id, Version::new(2), "Event2")],
                AppendOptions::expect_version(Version::initial()),
            )
            .await;

        assert!(matches!(
            result,
            Err(EventStoreError::ConcurrencyConflict { .. })
        ));
    }

    #[tokio::test]
    async fn stale_event_versions_conflict_without_expected_version() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();

        store
            .append(
                vec![create_test_event(aggregate_id, Version::first(), "Event1")],
                AppendOptions::new(),
            )
            .await
            .unwrap();

        let result = store
            .append(
                vec![create_test_event(aggregate_id, Version::first(), "Event1")],
                AppendOptions::new(),
            )
            .await;

        assert!(result.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn multi_stream_commit_is_atomic() {
        let store = InMemoryEventStore::new();
        let stock = AggregateId::new();
        let reservation = AggregateId::new();

        store
            .append(
                vec![create_test_event(stock, Version::first(), "Registered")],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();

        // The stock stream is at version 1, so expecting 0 fails the whole commit.
        let commit = Commit::new()
            .with_stream(
                vec![create_test_event(reservation, Version::first(), "Created")],
                AppendOptions::expect_new(),
            )
            .with_stream(
                vec![create_test_event(stock, Version::new(2), "Reserved")],
                AppendOptions::expect_version(Version::initial()),
            )
            .with_outbox(message("inventory.reserved"));

        let result = store.commit(commit).await;
        assert!(result.unwrap_err().is_conflict());
        assert_eq!(store.event_count().await, 1);
        assert_eq!(store.undelivered_count().await, 0);
        assert!(!store.aggregate_exists(reservation).await.unwrap());
    }

    #[tokio::test]
    async fn multi_stream_commit_returns_versions_in_order() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();

        let commit = Commit::new()
            .with_stream(
                vec![
                    create_test_event(a, Version::new(1), "E1"),
                    create_test_event(a, Version::new(2), "E2"),
                ],
                AppendOptions::expect_new(),
            )
            .with_stream(
                vec![create_test_event(b, Version::first(), "E1")],
                AppendOptions::expect_new(),
            )
            .with_outbox(message("t"));

        let versions = store.commit(commit).await.unwrap();
        assert_eq!(versions, vec![Version::new(2), Version::first()]);
        assert_eq!(store.undelivered_count().await, 1);
    }

    #[tokio::test]
    async fn read_all_from_pages_by_position() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        let events = (1..=5)
            .map(|v| create_test_event(id, Version::new(v), "E"))
            .collect();
        store.append(events, AppendOptions::new()).await.unwrap();

        let page = store.read_all_from(2, 2).await.unwrap();
        let positions: Vec<i64> = page.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![3, 4]);

        let rest = store.read_all_from(4, 100).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert!(store.read_all_from(5, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn outbox_delivery_lifecycle() {
        let store = InMemoryEventStore::new();
        let first = message("a");
        let second = message("b");
        store
            .commit(
                Commit::new()
                    .with_outbox(first.clone())
                    .with_outbox(second.clone()),
            )
            .await
            .unwrap();

        store
            .record_outbox_failure(first.id, "broker down")
            .await
            .unwrap();
        let pending = store.pending_outbox(10, 5).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("broker down"));

        // Messages at the attempt limit are no longer handed out.
        assert_eq!(store.pending_outbox(10, 1).await.unwrap().len(), 1);

        store.mark_outbox_delivered(second.id).await.unwrap();
        let pending = store.pending_outbox(10, 5).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, first.id);
    }

    #[tokio::test]
    async fn purge_removes_only_old_delivered_messages() {
        let store = InMemoryEventStore::new();
        let delivered = message("a");
        let pending = message("b");
        store
            .commit(
                Commit::new()
                    .with_outbox(delivered.clone())
                    .with_outbox(pending.clone()),
            )
            .await
            .unwrap();
        store.mark_outbox_delivered(delivered.id).await.unwrap();

        let an_hour_ago = chrono::Utc::now() - chrono::Duration::hours(1);
        assert_eq!(store.purge_delivered_outbox(an_hour_ago).await.unwrap(), 0);

        let later = chrono::Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(store.purge_delivered_outbox(later).await.unwrap(), 1);
        let remaining = store.outbox_messages().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, pending.id);
        assert_eq!(store.undelivered_count().await, 1);
    }

    #[tokio::test]
    async fn unknown_outbox_id_is_reported() {
        let store = InMemoryEventStore::new();
        let result = store.mark_outbox_delivered(OutboxId::new()).await;
        assert!(matches!(
            result,
            Err(EventStoreError::OutboxMessageNotFound(_))
        ));
    }
}
