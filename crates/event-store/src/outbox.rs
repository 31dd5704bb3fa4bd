//! Outbox messages: integration events stored in the same commit as the
//! state change that caused them, and published later by a relay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an outbox message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutboxId(Uuid);

impl OutboxId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OutboxId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OutboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message waiting to be published to the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: OutboxId,

    /// Destination topic (e.g. "inventory.reserved").
    pub topic: String,

    /// Partitioning key, usually the id of the entity the message is about.
    pub key: String,

    pub payload: serde_json::Value,

    pub created_at: DateTime<Utc>,

    /// Failed publish attempts so far.
    pub attempts: u32,

    pub last_error: Option<String>,
}

impl OutboxMessage {
    /// Creates a fresh, never-attempted message.
    pub fn new(
        topic: impl Into<String>,
        key: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: OutboxId::new(),
            topic: topic.into(),
            key: key.into(),
            payload,
            created_at: Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_message_has_no_attempts() {
        let msg = OutboxMessage::new("inventory.reserved", "order-1", serde_json::json!({}));
        assert_eq!(msg.topic, "inventory.reserved");
        assert_eq!(msg.key, "order-1");
        assert_eq!(msg.attempts, 0);
        assert!(msg.last_error.is_none());
    }
}
