//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events are facts that have happened. They are immutable and named
/// in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name stored alongside the payload.
    fn event_type(&self) -> &'static str;
}

/// Trait for event-sourced aggregates.
///
/// Command methods inspect state and return the events a request produces
/// without changing anything. `apply` folds an event into state; it must be
/// deterministic and must not fail.
pub trait Aggregate: Default + Clone + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors this aggregate's commands can produce.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's id, or None before its creation event.
    fn id(&self) -> Option<AggregateId>;

    /// Returns the version the aggregate was loaded at.
    fn version(&self) -> Version;

    /// Sets the aggregate version after loading or saving.
    fn set_version(&mut self, version: Version);

    /// Applies an event to the aggregate, updating its state.
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }

    /// Returns a copy of the aggregate with `events` applied.
    fn with_events(&self, events: &[Self::Event]) -> Self {
        let mut next = self.clone();
        next.apply_events(events.iter().cloned());
        next
    }
}
