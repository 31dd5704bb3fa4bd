use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{AggregateId, EventEnvelope, EventStoreError, OutboxId, OutboxMessage, Result, Version};

/// Options for appending events to one stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendOptions {
    /// Expected version of the stream for optimistic concurrency control.
    /// If None, the events' own versions still have to follow the stored one.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// Creates options with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects the stream to be at a specific version.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Expects the stream not to exist yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }

    /// Expects `version`, treating the initial version as "new stream".
    pub fn for_loaded(version: Version) -> Self {
        if version == Version::initial() {
            Self::expect_new()
        } else {
            Self::expect_version(version)
        }
    }
}

/// Events for one stream within a [`Commit`].
#[derive(Debug, Clone)]
pub struct StreamAppend {
    pub events: Vec<EventEnvelope>,
    pub options: AppendOptions,
}

impl StreamAppend {
    pub fn new(events: Vec<EventEnvelope>, options: AppendOptions) -> Self {
        Self { events, options }
    }

    /// The stream this append targets, if it carries any events.
    pub fn aggregate_id(&self) -> Option<AggregateId> {
        self.events.first().map(|e| e.aggregate_id)
    }
}

/// An atomic unit of work: appends to any number of streams plus outbox
/// messages. Either everything is stored or nothing is.
#[derive(Debug, Clone, Default)]
pub struct Commit {
    pub streams: Vec<StreamAppend>,
    pub outbox: Vec<OutboxMessage>,
}

impl Commit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds events for one stream.
    pub fn with_stream(mut self, events: Vec<EventEnvelope>, options: AppendOptions) -> Self {
        self.streams.push(StreamAppend::new(events, options));
        self
    }

    /// Adds an outbox message.
    pub fn with_outbox(mut self, message: OutboxMessage) -> Self {
        self.outbox.push(message);
        self
    }

    /// Returns true if the commit would store nothing.
    pub fn is_empty(&self) -> bool {
        self.streams.iter().all(|s| s.events.is_empty()) && self.outbox.is_empty()
    }

    /// Total number of events across all streams.
    pub fn event_count(&self) -> usize {
        self.streams.iter().map(|s| s.events.len()).sum()
    }
}

/// Core trait for event store implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Atomically stores a commit.
    ///
    /// Every stream's expected version is checked before anything is written.
    /// A mismatch on any stream fails the whole commit with
    /// `ConcurrencyConflict`. Stored events receive increasing global
    /// positions in commit order.
    ///
    /// Returns the new version of each stream, in the order given.
    async fn commit(&self, commit: Commit) -> Result<Vec<Version>>;

    /// Retrieves all events for a stream, oldest first.
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    /// Reads up to `limit` events with a global position greater than `after`,
    /// in position order.
    async fn read_all_from(&self, after: i64, limit: usize) -> Result<Vec<EventEnvelope>>;

    /// Gets the current version of a stream, or None if it has no events.
    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;

    /// Returns undelivered outbox messages with fewer than `max_attempts`
    /// failed attempts, oldest first.
    async fn pending_outbox(&self, limit: usize, max_attempts: u32)
    -> Result<Vec<OutboxMessage>>;

    /// Marks an outbox message as published.
    async fn mark_outbox_delivered(&self, id: OutboxId) -> Result<()>;

    /// Records a failed publish attempt.
    async fn record_outbox_failure(&self, id: OutboxId, error: &str) -> Result<()>;

    /// Deletes messages delivered before `delivered_before`. Undelivered and
    /// parked messages are kept. Returns the number removed.
    async fn purge_delivered_outbox(&self, delivered_before: DateTime<Utc>) -> Result<u64>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Appends events to a single stream.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        let versions = self.commit(Commit::new().with_stream(events, options)).await?;
        versions
            .into_iter()
            .next()
            .ok_or_else(|| EventStoreError::InvalidAppend("Cannot append empty event list".into()))
    }

    /// Checks if a stream has any events.
    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Validates the events of one stream before appending.
pub fn validate_events_for_append(events: &[EventEnvelope]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "Cannot append empty event list".to_string(),
        ));
    };

    for event in events.iter().skip(1) {
        if event.aggregate_id != first.aggregate_id {
            return Err(EventStoreError::InvalidAppend(
                "All events must be for the same aggregate".to_string(),
            ));
        }
        if event.aggregate_type != first.aggregate_type {
            return Err(EventStoreError::InvalidAppend(
                "All events must have the same aggregate type".to_string(),
            ));
        }
    }

    let mut expected_version = first.version;
    for event in events.iter().skip(1) {
        expected_version = expected_version.next();
        if event.version != expected_version {
            return Err(EventStoreError::InvalidAppend(format!(
                "Event versions must be sequential. Expected {}, got {}",
                expected_version, event.version
            )));
        }
    }

    Ok(())
}

/// Validates a whole commit: every stream valid, no stream twice.
pub fn validate_commit(commit: &Commit) -> Result<()> {
    let mut seen = HashSet::new();
    for stream in &commit.streams {
        validate_events_for_append(&stream.events)?;
        if let Some(id) = stream.aggregate_id()
            && !seen.insert(id)
        {
            return Err(EventStoreError::InvalidAppend(format!(
                "Aggregate {id} appears more than once in a commit"
            )));
        }
    }
    Ok(())
}

/// Checks the stored version of a stream against an append.
///
/// The first new event must directly follow the stored version, and the
/// stored version must equal the expected one when given.
pub fn check_stream_version(
    aggregate_id: AggregateId,
    current: Version,
    first_new: Version,
    options: AppendOptions,
) -> Result<()> {
    if let Some(expected) = options.expected_version
        && current != expected
    {
        return Err(EventStoreError::ConcurrencyConflict {
            aggregate_id,
            expected,
            actual: current,
        });
    }
    if first_new != current.next() {
        return Err(EventStoreError::ConcurrencyConflict {
            aggregate_id,
            expected: options.expected_version.unwrap_or(current),
            actual: current,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(aggregate_id: AggregateId, version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("StockItem")
            .event_type("StockAdded")
            .version(Version::new(version))
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    #[test]
    fn rejects_empty_stream() {
        assert!(validate_events_for_append(&[]).is_err());
    }

    #[test]
    fn rejects_version_gaps() {
        let id = AggregateId::new();
        let result = validate_events_for_append(&[event(id, 1), event(id, 3)]);
        assert!(matches!(result, Err(EventStoreError::InvalidAppend(_))));
    }

    #[test]
    fn rejects_same_stream_twice_in_commit() {
        let id = AggregateId::new();
        let commit = Commit::new()
            .with_stream(vec![event(id, 1)], AppendOptions::expect_new())
            .with_stream(vec![event(id, 2)], AppendOptions::new());
        assert!(validate_commit(&commit).is_err());
    }

    #[test]
    fn version_check_requires_contiguous_events() {
        let id = AggregateId::new();
        assert!(check_stream_version(id, Version::new(2), Version::new(3), AppendOptions::new()).is_ok());
        assert!(check_stream_version(id, Version::new(2), Version::new(2), AppendOptions::new()).is_err());
        assert!(
            check_stream_version(
                id,
                Version::new(2),
                Version::new(3),
                AppendOptions::expect_version(Version::first())
            )
            .is_err()
        );
    }

    #[test]
    fn for_loaded_maps_initial_to_expect_new() {
        assert_eq!(
            AppendOptions::for_loaded(Version::initial()).expected_version,
            Some(Version::initial())
        );
        assert_eq!(
            AppendOptions::for_loaded(Version::new(4)).expected_version,
            Some(Version::new(4))
        );
    }

    #[test]
    fn outbox_only_commit_is_not_empty() {
        let commit =
            Commit::new().with_outbox(OutboxMessage::new("t", "k", serde_json::json!({})));
        assert!(!commit.is_empty());
        assert_eq!(commit.event_count(), 0);
    }
}
