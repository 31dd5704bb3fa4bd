//! Collects the changes of one business operation into a single commit.

use common::AggregateId;
use event_store::{AppendOptions, Commit, EventEnvelope, EventStore, OutboxMessage, Version};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::contracts::IntegrationEvent;
use crate::error::DomainError;

/// Events for several aggregates plus outbox messages, stored atomically.
///
/// Each recorded stream is conditioned on the version its aggregate was
/// loaded at, so a concurrent writer to any of them fails the whole unit.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    commit: Commit,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `events` produced by `loaded`. Empty event lists are skipped.
    pub fn record<A: Aggregate>(
        &mut self,
        aggregate_id: AggregateId,
        loaded: &A,
        events: &[A::Event],
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }
        let envelopes = build_envelopes::<A>(aggregate_id, loaded.version(), events)?;
        self.commit = std::mem::take(&mut self.commit)
            .with_stream(envelopes, AppendOptions::for_loaded(loaded.version()));
        Ok(())
    }

    /// Enqueues an integration event for publication after commit.
    pub fn publish<E: IntegrationEvent>(&mut self, event: &E) -> Result<(), DomainError> {
        self.enqueue(event.to_outbox()?);
        Ok(())
    }

    pub fn enqueue(&mut self, message: OutboxMessage) {
        self.commit.outbox.push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.commit.is_empty()
    }

    /// Stores everything. Returns the new version of each recorded stream in
    /// recording order.
    pub async fn commit<S: EventStore + ?Sized>(
        self,
        store: &S,
    ) -> Result<Vec<Version>, DomainError> {
        if self.commit.is_empty() {
            return Ok(Vec::new());
        }
        Ok(store.commit(self.commit).await?)
    }
}

/// Wraps domain events in envelopes numbered after `current_version`.
pub fn build_envelopes<A: Aggregate>(
    aggregate_id: AggregateId,
    current_version: Version,
    events: &[A::Event],
) -> Result<Vec<EventEnvelope>, DomainError> {
    let mut envelopes = Vec::with_capacity(events.len());
    let mut version = current_version;

    for event in events {
        version = version.next();
        let envelope = EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type(A::aggregate_type())
            .event_type(event.event_type())
            .version(version)
            .payload(event)?
            .build()?;
        envelopes.push(envelope);
    }

    Ok(envelopes)
}
