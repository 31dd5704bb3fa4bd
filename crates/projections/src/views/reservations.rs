//! Reservations read model: the sweeper's "ACTIVE past deadline" query and
//! per-order lookups.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::reservation::ReservationEvent;
use domain::{Aggregate, OrderId, ProductId, Reservation, ReservationStatus};
use event_store::EventEnvelope;
use tokio::sync::RwLock;

use crate::projection::{Projection, ProjectionPosition};
use crate::{ProjectionError, Result};

/// Denormalized view of one reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationSummary {
    pub reservation_id: AggregateId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ReservationSummary {
    /// Still ACTIVE in the log but past its deadline.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Active && now >= self.expires_at
    }
}

#[derive(Default)]
struct ReservationsState {
    reservations: HashMap<AggregateId, ReservationSummary>,
    by_order: HashMap<OrderId, Vec<AggregateId>>,
    position: ProjectionPosition,
}

/// Read model view over all reservations.
#[derive(Clone, Default)]
pub struct ReservationsView {
    state: Arc<RwLock<ReservationsState>>,
}

impl ReservationsView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, reservation_id: AggregateId) -> Option<ReservationSummary> {
        self.state
            .read()
            .await
            .reservations
            .get(&reservation_id)
            .cloned()
    }

    /// All reservations of an order, in creation order.
    pub async fn for_order(&self, order_id: OrderId) -> Vec<ReservationSummary> {
        let state = self.state.read().await;
        state
            .by_order
            .get(&order_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.reservations.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// ACTIVE reservations whose deadline is at or before `now`, oldest
    /// deadline first.
    pub async fn expired_active(&self, now: DateTime<Utc>) -> Vec<ReservationSummary> {
        let state = self.state.read().await;
        let mut overdue: Vec<_> = state
            .reservations
            .values()
            .filter(|r| r.is_overdue(now))
            .cloned()
            .collect();
        overdue.sort_by_key(|r| r.expires_at);
        overdue
    }

    /// Number of reservations in ACTIVE status.
    pub async fn active_count(&self) -> usize {
        self.state
            .read()
            .await
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Active)
            .count()
    }
}

#[async_trait]
impl Projection for ReservationsView {
    fn name(&self) -> &'static str {
        "ReservationsView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;
        if state.position.has_seen(event.position) {
            return Ok(());
        }
        state.position = state.position.advance_to(event.position);

        if !event.is_from(Reservation::aggregate_type()) {
            return Ok(());
        }

        let reservation_event: ReservationEvent = event
            .decode()
            .map_err(|e| ProjectionError::deserialization(&event.event_type, e))?;
        let id = event.aggregate_id;

        match reservation_event {
            ReservationEvent::ReservationCreated(data) => {
                state.by_order.entry(data.order_id).or_default().push(id);
                state.reservations.insert(
                    id,
                    ReservationSummary {
                        reservation_id: id,
                        order_id: data.order_id,
                        product_id: data.product_id,
                        quantity: data.quantity,
                        status: ReservationStatus::Active,
                        created_at: data.created_at,
                        expires_at: data.expires_at,
                    },
                );
            }
            ReservationEvent::ReservationConfirmed(_) => set_status(&mut state, id, ReservationStatus::Confirmed),
            ReservationEvent::ReservationReleased(_) => set_status(&mut state, id, ReservationStatus::Released),
            ReservationEvent::ReservationExpired(_) => set_status(&mut state, id, ReservationStatus::Expired),
        }

        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        *self.state.write().await = ReservationsState::default();
        Ok(())
    }
}

fn set_status(state: &mut ReservationsState, id: AggregateId, status: ReservationStatus) {
    if let Some(summary) = state.reservations.get_mut(&id) {
        summary.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use domain::DomainEvent;

    struct Log {
        next_position: i64,
    }

    impl Log {
        fn envelope(&mut self, id: AggregateId, version: i64, event: &ReservationEvent) -> EventEnvelope {
            self.next_position += 1;
            let mut envelope = EventEnvelope::builder()
                .aggregate_id(id)
                .aggregate_type("Reservation")
                .event_type(event.event_type())
                .version(event_store::Version::new(version))
                .payload(event)
                .unwrap()
                .build()
                .unwrap();
            envelope.position = self.next_position;
            envelope
        }
    }

    fn created(order_id: OrderId, product: &str, expires_at: DateTime<Utc>) -> (AggregateId, ReservationEvent) {
        let product_id = ProductId::new(product);
        let id = Reservation::stream_id(order_id, &product_id);
        let event = ReservationEvent::ReservationCreated(domain::reservation::ReservationCreatedData {
            reservation_id: id,
            order_id,
            product_id,
            quantity: 2,
            created_at: expires_at - Duration::minutes(15),
            expires_at,
        });
        (id, event)
    }

    #[tokio::test]
    async fn tracks_lifecycle_and_order_index() {
        let view = ReservationsView::new();
        let mut log = Log { next_position: 0 };
        let now = Utc::now();
        let order_id = OrderId::new();

        let (a, ev) = created(order_id, "A", now + Duration::minutes(5));
        view.handle(&log.envelope(a, 1, &ev)).await.unwrap();
        let (b, ev) = created(order_id, "B", now + Duration::minutes(5));
        view.handle(&log.envelope(b, 1, &ev)).await.unwrap();

        let confirmed = ReservationEvent::ReservationConfirmed(
            domain::reservation::ReservationConfirmedData { confirmed_at: now },
        );
        view.handle(&log.envelope(a, 2, &confirmed)).await.unwrap();

        let lines = view.for_order(order_id).await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].status, ReservationStatus::Confirmed);
        assert_eq!(lines[1].status, ReservationStatus::Active);
        assert_eq!(view.active_count().await, 1);
    }

    #[tokio::test]
    async fn expired_active_excludes_future_and_terminal() {
        let view = ReservationsView::new();
        let mut log = Log { next_position: 0 };
        let now = Utc::now();

        let (overdue, ev) = created(OrderId::new(), "A", now - Duration::seconds(1));
        view.handle(&log.envelope(overdue, 1, &ev)).await.unwrap();
        let (at_deadline, ev) = created(OrderId::new(), "B", now);
        view.handle(&log.envelope(at_deadline, 1, &ev)).await.unwrap();
        let (future, ev) = created(OrderId::new(), "C", now + Duration::seconds(30));
        view.handle(&log.envelope(future, 1, &ev)).await.unwrap();
        let (released, ev) = created(OrderId::new(), "D", now - Duration::seconds(5));
        view.handle(&log.envelope(released, 1, &ev)).await.unwrap();
        let release = ReservationEvent::ReservationReleased(
            domain::reservation::ReservationReleasedData {
                released_at: now,
                reason: "cancelled".into(),
            },
        );
        view.handle(&log.envelope(released, 2, &release)).await.unwrap();

        let ids: Vec<_> = view
            .expired_active(now)
            .await
            .into_iter()
            .map(|r| r.reservation_id)
            .collect();
        assert_eq!(ids, vec![overdue, at_deadline]);
    }

    #[tokio::test]
    async fn ignores_other_aggregates_and_replays() {
        let view = ReservationsView::new();
        let mut log = Log { next_position: 0 };
        let (id, ev) = created(OrderId::new(), "A", Utc::now());
        let envelope = log.envelope(id, 1, &ev);

        view.handle(&envelope).await.unwrap();
        view.handle(&envelope).await.unwrap();
        assert_eq!(view.position().await.events_processed, 1);

        let mut foreign = envelope.clone();
        foreign.aggregate_type = "StockItem".into();
        foreign.position = 2;
        view.handle(&foreign).await.unwrap();
        assert_eq!(view.position().await.last_position, 2);

        view.reset().await.unwrap();
        assert!(view.get(id).await.is_none());
    }
}
