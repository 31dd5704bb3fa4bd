//! Projection error types.

use thiserror::Error;

/// Errors that can occur during projection processing.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// Failed to deserialize an event payload.
    #[error("Event deserialization error in {event_type}: {source}")]
    Deserialization {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ProjectionError {
    pub fn deserialization(event_type: &str, source: serde_json::Error) -> Self {
        ProjectionError::Deserialization {
            event_type: event_type.to_string(),
            source,
        }
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
