//! Core projection trait and position tracking.

use async_trait::async_trait;
use event_store::EventEnvelope;

use crate::Result;

/// How far into the global log a projection has read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    /// Global position of the last event applied. Zero before any.
    pub last_position: i64,

    /// Number of events applied.
    pub events_processed: u64,
}

impl ProjectionPosition {
    /// Creates a new position at zero.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns true if the event at `position` was already applied.
    pub fn has_seen(&self, position: i64) -> bool {
        position <= self.last_position
    }

    /// Advances past the event at `position`.
    pub fn advance_to(&self, position: i64) -> Self {
        Self {
            last_position: position.max(self.last_position),
            events_processed: self.events_processed + 1,
        }
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "position({}, {} events)",
            self.last_position, self.events_processed
        )
    }
}

/// A projection that processes events and updates a read model.
///
/// `handle` is called with events in global position order and must ignore
/// events at or before its current position, so that overlapping catch-ups
/// apply every event once.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Returns the name of this projection.
    fn name(&self) -> &'static str;

    /// Handles a single event, updating the projection's read model.
    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    /// Returns the current position of this projection.
    async fn position(&self) -> ProjectionPosition;

    /// Resets the projection to its initial state.
    async fn reset(&self) -> Result<()>;
}
