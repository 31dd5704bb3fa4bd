//! Outbox relay: drains stored messages onto the event bus.
//!
//! Messages are written in the same commit as the state change that caused
//! them. The relay publishes them afterwards and marks each one delivered,
//! so delivery is at-least-once: a crash between publish and mark
//! re-publishes on the next drain.
//!
//! Delivered messages are deleted once they are older than the retention
//! window; parked ones stay for inspection.

use std::time::Duration;

use chrono::{DateTime, Utc};
use event_store::{EventStore, OutboxMessage};
use tokio::sync::watch;

use crate::Result;
use crate::messaging::EventBus;

/// Outcome of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub published: usize,
    pub failed: usize,
    /// Messages that used their last attempt in this drain.
    pub parked: usize,
}

impl DrainReport {
    pub fn is_idle(&self) -> bool {
        self.published == 0 && self.failed == 0
    }
}

/// How often `run` purges delivered messages.
const PURGE_EVERY: Duration = Duration::from_secs(60);

/// Publishes pending outbox messages in batches.
pub struct OutboxRelay<S: EventStore, B: EventBus> {
    store: S,
    bus: B,
    batch_size: usize,
    max_attempts: u32,
    retention: chrono::Duration,
}

impl<S: EventStore, B: EventBus> OutboxRelay<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            batch_size: 100,
            max_attempts: 10,
            retention: chrono::Duration::hours(24),
        }
    }

    /// How long delivered messages are kept before being purged.
    pub fn with_retention(mut self, retention: chrono::Duration) -> Self {
        self.retention = retention.max(chrono::Duration::zero());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Attempts before a message is left parked in the outbox.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Publishes one batch of pending messages.
    #[tracing::instrument(skip(self))]
    pub async fn drain_once(&self) -> Result<DrainReport> {
        let pending = self
            .store
            .pending_outbox(self.batch_size, self.max_attempts)
            .await?;
        let mut report = DrainReport::default();

        for message in pending {
            match self
                .bus
                .publish(&message.topic, &message.key, &message.payload)
                .await
            {
                Ok(()) => {
                    self.store.mark_outbox_delivered(message.id).await?;
                    metrics::counter!("outbox_published_total", "topic" => message.topic.clone())
                        .increment(1);
                    report.published += 1;
                }
                Err(e) => {
                    let error = e.to_string();
                    self.store.record_outbox_failure(message.id, &error).await?;
                    metrics::counter!("outbox_publish_failures_total", "topic" => message.topic.clone())
                        .increment(1);
                    report.failed += 1;
                    if self.is_last_attempt(&message) {
                        report.parked += 1;
                        tracing::error!(
                            outbox_id = %message.id,
                            topic = %message.topic,
                            key = %message.key,
                            attempts = message.attempts + 1,
                            error = %error,
                            "outbox message parked after final attempt"
                        );
                    } else {
                        tracing::warn!(
                            outbox_id = %message.id,
                            topic = %message.topic,
                            error = %error,
                            "outbox publish failed, will retry"
                        );
                    }
                }
            }
        }

        if !report.is_idle() {
            tracing::debug!(
                published = report.published,
                failed = report.failed,
                "outbox drained"
            );
        }
        Ok(report)
    }

    /// Deletes messages delivered more than the retention window before `now`.
    pub async fn purge_delivered(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now
            .checked_sub_signed(self.retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let purged = self.store.purge_delivered_outbox(cutoff).await?;
        if purged > 0 {
            metrics::counter!("outbox_purged_total").increment(purged);
            tracing::debug!(purged, "delivered outbox messages purged");
        }
        Ok(purged)
    }

    /// Drains every `interval` until `shutdown` flips to true, purging
    /// delivered messages once a minute.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut purge_ticker = tokio::time::interval(PURGE_EVERY);
        purge_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            interval_ms = interval.as_millis() as u64,
            retention_secs = self.retention.num_seconds(),
            "outbox relay started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.drain_once().await {
                        tracing::error!(error = %e, "outbox drain failed");
                    }
                }
                _ = purge_ticker.tick() => {
                    if let Err(e) = self.purge_delivered(Utc::now()).await {
                        tracing::error!(error = %e, "outbox purge failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("outbox relay stopped");
    }

    fn is_last_attempt(&self, message: &OutboxMessage) -> bool {
        message.attempts + 1 >= self.max_attempts
    }
}
