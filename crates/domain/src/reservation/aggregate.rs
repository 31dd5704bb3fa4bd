//! Reservation aggregate implementation.

use chrono::{DateTime, Duration, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::value_objects::{OrderId, ProductId};

use super::events::{
    ReservationConfirmedData, ReservationCreatedData, ReservationExpiredData,
    ReservationReleasedData,
};
use super::{ReservationError, ReservationEvent, ReservationStatus};

/// A claim on stock for one order line, valid until `expires_at`.
///
/// The stored status changes only through events. Whether an ACTIVE
/// reservation is still usable is evaluated against a caller-supplied clock,
/// since the deadline can pass before the sweeper gets to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reservation {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    order_id: Option<OrderId>,
    product_id: Option<ProductId>,
    quantity: u32,
    status: ReservationStatus,
    created_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    confirmed_at: Option<DateTime<Utc>>,
    released_at: Option<DateTime<Utc>>,
    release_reason: Option<String>,
    expired_at: Option<DateTime<Utc>>,
}

impl Aggregate for Reservation {
    type Event = ReservationEvent;
    type Error = ReservationError;

    fn aggregate_type() -> &'static str {
        "Reservation"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            ReservationEvent::ReservationCreated(data) => {
                self.id = Some(data.reservation_id);
                self.order_id = Some(data.order_id);
                self.product_id = Some(data.product_id);
                self.quantity = data.quantity;
                self.status = ReservationStatus::Active;
                self.created_at = Some(data.created_at);
                self.expires_at = Some(data.expires_at);
            }
            ReservationEvent::ReservationConfirmed(data) => {
                self.status = ReservationStatus::Confirmed;
                self.confirmed_at = Some(data.confirmed_at);
            }
            ReservationEvent::ReservationReleased(data) => {
                self.status = ReservationStatus::Released;
                self.released_at = Some(data.released_at);
                self.release_reason = Some(data.reason);
            }
            ReservationEvent::ReservationExpired(data) => {
                self.status = ReservationStatus::Expired;
                self.expired_at = Some(data.expired_at);
            }
        }
    }
}

impl Reservation {
    /// Stream id for the reservation of one order line. Deterministic, so a
    /// redelivered request lands on the same stream.
    pub fn stream_id(order_id: OrderId, product_id: &ProductId) -> AggregateId {
        AggregateId::derived("reservation", &format!("{order_id}:{product_id}"))
    }
}

// Query methods
impl Reservation {
    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn product_id(&self) -> Option<&ProductId> {
        self.product_id.as_ref()
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn status(&self) -> ReservationStatus {
        self.status
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    pub fn released_at(&self) -> Option<DateTime<Utc>> {
        self.released_at
    }

    pub fn release_reason(&self) -> Option<&str> {
        self.release_reason.as_deref()
    }

    pub fn expired_at(&self) -> Option<DateTime<Utc>> {
        self.expired_at
    }

    /// ACTIVE and the deadline has not passed.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.id.is_some() && self.status == ReservationStatus::Active && !self.deadline_passed(now)
    }

    /// EXPIRED, or ACTIVE with the deadline reached.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            ReservationStatus::Expired => true,
            ReservationStatus::Active => self.id.is_some() && self.deadline_passed(now),
            _ => false,
        }
    }

    fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

// Command methods (return events)
impl Reservation {
    /// Creates the reservation in ACTIVE with `expires_at = now + ttl`. The
    /// TTL must be non-negative and the deadline representable.
    pub fn create(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReservationEvent>, ReservationError> {
        if self.id.is_some() {
            return Err(ReservationError::AlreadyExists);
        }
        if quantity == 0 {
            return Err(ReservationError::InvalidQuantity { quantity });
        }
        let invalid_ttl = ReservationError::InvalidTtl {
            ttl_secs: ttl.num_seconds(),
        };
        if ttl < Duration::zero() {
            return Err(invalid_ttl);
        }
        let expires_at = now.checked_add_signed(ttl).ok_or(invalid_ttl)?;

        Ok(vec![ReservationEvent::ReservationCreated(
            ReservationCreatedData {
                reservation_id: Reservation::stream_id(order_id, &product_id),
                order_id,
                product_id,
                quantity,
                created_at: now,
                expires_at,
            },
        )])
    }

    /// Confirms an ACTIVE reservation whose deadline has not passed.
    pub fn confirm(&self, now: DateTime<Utc>) -> Result<Vec<ReservationEvent>, ReservationError> {
        self.ensure_created()?;
        self.status.validate_transition(ReservationStatus::Confirmed)?;
        if let Some(expires_at) = self.expires_at
            && now >= expires_at
        {
            return Err(ReservationError::Expired { expires_at });
        }

        Ok(vec![ReservationEvent::ReservationConfirmed(
            ReservationConfirmedData { confirmed_at: now },
        )])
    }

    /// Releases an ACTIVE reservation. A reservation that already left
    /// ACTIVE yields no events.
    pub fn release(
        &self,
        now: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Result<Vec<ReservationEvent>, ReservationError> {
        self.ensure_created()?;
        if self.status.is_terminal() {
            return Ok(vec![]);
        }
        self.status.validate_transition(ReservationStatus::Released)?;

        Ok(vec![ReservationEvent::ReservationReleased(
            ReservationReleasedData {
                released_at: now,
                reason: reason.into(),
            },
        )])
    }

    /// Expires an ACTIVE reservation whose deadline has passed.
    pub fn expire(&self, now: DateTime<Utc>) -> Result<Vec<ReservationEvent>, ReservationError> {
        self.ensure_created()?;
        self.status.validate_transition(ReservationStatus::Expired)?;
        if let Some(expires_at) = self.expires_at
            && now < expires_at
        {
            return Err(ReservationError::NotYetExpired { expires_at });
        }

        Ok(vec![ReservationEvent::ReservationExpired(
            ReservationExpiredData { expired_at: now },
        )])
    }

    fn ensure_created(&self) -> Result<(), ReservationError> {
        if self.id.is_none() {
            return Err(ReservationError::NotCreated);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(ttl_secs: i64) -> (Reservation, DateTime<Utc>) {
        let now = Utc::now();
        let mut reservation = Reservation::default();
        let events = reservation
            .create(
                OrderId::new(),
                ProductId::new("P1"),
                3,
                Duration::seconds(ttl_secs),
                now,
            )
            .unwrap();
        reservation.apply_events(events);
        (reservation, now)
    }

    #[test]
    fn create_sets_deadline_and_deterministic_id() {
        let (reservation, now) = created(60);
        let order_id = reservation.order_id().unwrap();
        assert_eq!(
            reservation.id(),
            Some(Reservation::stream_id(order_id, &ProductId::new("P1")))
        );
        assert_eq!(reservation.status(), ReservationStatus::Active);
        assert_eq!(reservation.expires_at(), Some(now + Duration::seconds(60)));
        assert!(reservation.is_active(now));
    }

    #[test]
    fn create_rejects_zero_quantity_and_duplicates() {
        let fresh = Reservation::default();
        let result = fresh.create(
            OrderId::new(),
            ProductId::new("P1"),
            0,
            Duration::seconds(1),
            Utc::now(),
        );
        assert!(matches!(
            result,
            Err(ReservationError::InvalidQuantity { quantity: 0 })
        ));

        let (reservation, now) = created(60);
        let again = reservation.create(OrderId::new(), ProductId::new("P1"), 1, Duration::zero(), now);
        assert!(matches!(again, Err(ReservationError::AlreadyExists)));
    }

    #[test]
    fn create_rejects_negative_and_unrepresentable_ttl() {
        let fresh = Reservation::default();
        let now = Utc::now();
        let negative = fresh.create(OrderId::new(), ProductId::new("P1"), 1, Duration::seconds(-1), now);
        assert!(matches!(negative, Err(ReservationError::InvalidTtl { ttl_secs: -1 })));

        let huge = fresh.create(OrderId::new(), ProductId::new("P1"), 1, Duration::MAX, now);
        let err = huge.unwrap_err();
        assert!(matches!(err, ReservationError::InvalidTtl { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[test]
    fn confirm_before_deadline() {
        let (mut reservation, now) = created(60);
        reservation.apply_events(reservation.confirm(now).unwrap());
        assert_eq!(reservation.status(), ReservationStatus::Confirmed);
        assert_eq!(reservation.confirmed_at(), Some(now));
    }

    #[test]
    fn confirm_after_deadline_fails() {
        let (reservation, now) = created(60);
        let later = now + Duration::seconds(60);
        assert!(matches!(
            reservation.confirm(later),
            Err(ReservationError::Expired { .. })
        ));
        assert!(reservation.is_expired(later));
        assert!(!reservation.is_active(later));
    }

    #[test]
    fn ttl_zero_is_expired_immediately() {
        let (mut reservation, now) = created(0);
        assert!(reservation.is_expired(now));
        reservation.apply_events(reservation.expire(now).unwrap());
        assert_eq!(reservation.status(), ReservationStatus::Expired);
    }

    #[test]
    fn expire_before_deadline_fails() {
        let (reservation, now) = created(60);
        assert!(matches!(
            reservation.expire(now),
            Err(ReservationError::NotYetExpired { .. })
        ));
    }

    #[test]
    fn terminal_states_are_final() {
        let (mut reservation, now) = created(60);
        reservation.apply_events(reservation.confirm(now).unwrap());

        assert!(matches!(
            reservation.expire(now + Duration::seconds(61)),
            Err(ReservationError::IllegalTransition {
                from: ReservationStatus::Confirmed,
                to: ReservationStatus::Expired
            })
        ));
        assert!(matches!(
            reservation.confirm(now),
            Err(ReservationError::IllegalTransition { .. })
        ));
        assert!(reservation.release(now, "cancelled").unwrap().is_empty());
    }

    #[test]
    fn release_is_idempotent() {
        let (mut reservation, now) = created(60);
        reservation.apply_events(reservation.release(now, "order cancelled").unwrap());
        assert_eq!(reservation.status(), ReservationStatus::Released);
        assert_eq!(reservation.release_reason(), Some("order cancelled"));
        assert!(reservation.release(now, "again").unwrap().is_empty());
    }

    #[test]
    fn commands_on_missing_reservation_fail() {
        let reservation = Reservation::default();
        assert!(matches!(
            reservation.confirm(Utc::now()),
            Err(ReservationError::NotCreated)
        ));
        assert!(!reservation.is_expired(Utc::now()));
    }
}
