//! Periodic expiry of overdue reservations.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use event_store::EventStore;
use tokio::sync::watch;

use crate::Result;
use crate::reservations::{ReservationCoordinator, Transition};

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Overdue ACTIVE reservations found in the read model.
    pub examined: usize,
    pub expired: usize,
    /// Already moved on by someone else when loaded.
    pub skipped: usize,
    /// Left ACTIVE after an error; picked up again next tick.
    pub failed: usize,
}

/// Expires every ACTIVE reservation past its deadline. Each expiry releases
/// the held stock in the same commit as the status change.
pub struct ExpirySweeper<S: EventStore + Clone> {
    coordinator: Arc<ReservationCoordinator<S>>,
}

impl<S: EventStore + Clone> ExpirySweeper<S> {
    pub fn new(coordinator: Arc<ReservationCoordinator<S>>) -> Self {
        Self { coordinator }
    }

    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let started = Instant::now();
        let overdue = self
            .coordinator
            .read_models()
            .overdue_reservations(now)
            .await?;
        let mut report = SweepReport {
            examined: overdue.len(),
            ..SweepReport::default()
        };

        for reservation in overdue {
            match self.coordinator.expire(reservation.reservation_id, now).await {
                Ok(Transition::Applied(_)) => report.expired += 1,
                Ok(Transition::Unchanged(_)) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        reservation_id = %reservation.reservation_id,
                        order_id = %reservation.order_id,
                        error = %e,
                        "reservation expiry failed"
                    );
                }
            }
        }

        metrics::counter!("sweeper_runs_total").increment(1);
        metrics::histogram!("sweeper_duration_seconds").record(started.elapsed().as_secs_f64());
        if report.examined > 0 {
            tracing::info!(
                examined = report.examined,
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                "expiry sweep finished"
            );
        }
        Ok(report)
    }

    /// Sweeps every `interval` until `shutdown` flips to true.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(interval_ms = interval.as_millis() as u64, "expiry sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once(Utc::now()).await {
                        tracing::error!(error = %e, "expiry sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("expiry sweeper stopped");
    }
}
