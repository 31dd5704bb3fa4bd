//! Event bus abstraction, a logging bus for standalone runs and a recording
//! bus for tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors a bus can report when publishing.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    #[error("Event bus unavailable: {0}")]
    Unavailable(String),

    #[error("Message rejected by the bus: {0}")]
    Rejected(String),
}

/// At-least-once message publication.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &Value) -> Result<(), BusError>;
}

#[async_trait]
impl<B: EventBus + ?Sized> EventBus for Arc<B> {
    async fn publish(&self, topic: &str, key: &str, payload: &Value) -> Result<(), BusError> {
        (**self).publish(topic, key, payload).await
    }
}

/// A message as seen by a bus consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: String,
    pub payload: Value,
}

/// Writes every message to the log and keeps nothing.
///
/// Used when no broker is configured: the outbox still drains and each
/// event is visible at `info` level under the `event_bus` target.
#[derive(Debug, Clone, Default)]
pub struct LoggingEventBus {
    published: Arc<AtomicU64>,
}

impl LoggingEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages published since creation.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EventBus for LoggingEventBus {
    async fn publish(&self, topic: &str, key: &str, payload: &Value) -> Result<(), BusError> {
        tracing::info!(target: "event_bus", topic, key, %payload, "event published");
        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryBusState {
    messages: Vec<PublishedMessage>,
    failing: bool,
}

/// Records published messages; can be switched to fail for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventBus {
    state: Arc<RwLock<InMemoryBusState>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every publish fails with `BusError::Unavailable`.
    pub async fn set_failing(&self, failing: bool) {
        self.state.write().await.failing = failing;
    }

    /// All messages in publication order.
    pub async fn messages(&self) -> Vec<PublishedMessage> {
        self.state.read().await.messages.clone()
    }

    pub async fn messages_on(&self, topic: &str) -> Vec<PublishedMessage> {
        self.state
            .read()
            .await
            .messages
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Message counts per topic.
    pub async fn topic_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for message in &self.state.read().await.messages {
            *counts.entry(message.topic.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Removes and returns everything published so far.
    pub async fn take(&self) -> Vec<PublishedMessage> {
        std::mem::take(&mut self.state.write().await.messages)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, topic: &str, key: &str, payload: &Value) -> Result<(), BusError> {
        let mut state = self.state.write().await;
        if state.failing {
            return Err(BusError::Unavailable("in-memory bus set to fail".into()));
        }
        state.messages.push(PublishedMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn records_per_topic() {
        let bus = InMemoryEventBus::new();
        bus.publish("a", "k1", &json!({"n": 1})).await.unwrap();
        bus.publish("b", "k2", &json!({"n": 2})).await.unwrap();
        bus.publish("a", "k3", &json!({"n": 3})).await.unwrap();

        let on_a = bus.messages_on("a").await;
        assert_eq!(on_a.len(), 2);
        assert_eq!(on_a[1].key, "k3");
        assert_eq!(bus.topic_counts().await.get("b"), Some(&1));
    }

    #[tokio::test]
    async fn logging_bus_counts_without_keeping_messages() {
        let bus = LoggingEventBus::new();
        let shared = Arc::new(bus.clone());
        bus.publish("a", "k1", &json!({"n": 1})).await.unwrap();
        shared.publish("b", "k2", &json!({"n": 2})).await.unwrap();
        assert_eq!(bus.published(), 2);
    }

    #[tokio::test]
    async fn failing_bus_records_nothing() {
        let bus = InMemoryEventBus::new();
        bus.set_failing(true).await;
        let err = bus.publish("a", "k", &json!(null)).await.unwrap_err();
        assert!(matches!(err, BusError::Unavailable(_)));
        assert!(bus.messages().await.is_empty());

        bus.set_failing(false).await;
        bus.publish("a", "k", &json!(null)).await.unwrap();
        assert_eq!(bus.take().await.len(), 1);
        assert!(bus.messages().await.is_empty());
    }
}
