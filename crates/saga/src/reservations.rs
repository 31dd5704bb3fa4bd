//! Reservation coordination: every change to a reservation and the stock it
//! holds is one commit over both streams.
//!
//! The stock item and the reservation are loaded, both decisions are made,
//! and the events for both streams (plus any integration events) are stored
//! together, each conditioned on the version it was loaded at. A concurrent
//! writer to either stream turns the commit into a conflict, and the whole
//! operation is retried from a fresh load.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use common::AggregateId;
use domain::contracts::{InventoryReservationFailed, InventoryReserved, LowStockAlert};
use domain::inventory::note_low_stock;
use domain::{
    Aggregate, CommandHandler, DomainError, ErrorKind, OrderId, OrderLine, ProductId, Reservation,
    ReservationStatus, RetryPolicy, StockItem, UnitOfWork, retry_on_conflict,
};
use event_store::EventStore;

use crate::read_side::ReadModels;
use crate::{Result, SagaError};

/// Result of a reservation state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The reservation moved to this status in this call.
    Applied(ReservationStatus),
    /// Nothing was written; the reservation is in this status.
    Unchanged(ReservationStatus),
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }

    pub fn status(&self) -> ReservationStatus {
        match self {
            Transition::Applied(status) | Transition::Unchanged(status) => *status,
        }
    }
}

/// One reserved order line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineReservation {
    pub reservation_id: AggregateId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub status: ReservationStatus,
    /// False when the reservation already existed, e.g. on redelivery.
    pub newly_created: bool,
}

/// All lines of an order, reserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderReservation {
    pub order_id: OrderId,
    pub lines: Vec<LineReservation>,
}

/// Outcome of an order-wide confirm or release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderOutcome {
    pub applied: usize,
    pub unchanged: usize,
    /// Reservations refused by a business rule, with the reason.
    pub refused: Vec<(ProductId, String)>,
}

/// Coordinates stock items and reservations.
pub struct ReservationCoordinator<S: EventStore + Clone> {
    store: S,
    stock: CommandHandler<S, StockItem>,
    reservations: CommandHandler<S, Reservation>,
    read: ReadModels<S>,
    retry: RetryPolicy,
    default_ttl: Duration,
}

impl<S: EventStore + Clone> ReservationCoordinator<S> {
    pub fn new(store: S, read: ReadModels<S>) -> Self {
        Self {
            stock: CommandHandler::new(store.clone()),
            reservations: CommandHandler::new(store.clone()),
            store,
            read,
            retry: RetryPolicy::default(),
            default_ttl: Duration::minutes(15),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn read_models(&self) -> &ReadModels<S> {
        &self.read
    }

    pub async fn get(&self, reservation_id: AggregateId) -> Result<Option<Reservation>> {
        Ok(self.reservations.load_existing(reservation_id).await?)
    }

    /// Reserves one line: stock first, and the reservation only if the stock
    /// could be held. Emits `InventoryReserved` (and a low-stock alert on a
    /// crossing) in the same commit.
    ///
    /// Reservation ids derive from order and product, so a repeated call
    /// returns the existing reservation untouched.
    #[tracing::instrument(skip(self), fields(order_id = %order_id, product_id = %product_id))]
    pub async fn reserve_line(
        &self,
        order_id: OrderId,
        product_id: &ProductId,
        quantity: u32,
        ttl: Duration,
    ) -> Result<LineReservation> {
        if quantity == 0 {
            return Err(SagaError::Validation(format!(
                "quantity for {product_id} must be greater than 0"
            )));
        }
        let line = self
            .retrying(move || async move {
                self.reserve_line_once(order_id, product_id, quantity, ttl)
                    .await
            })
            .await?;
        if line.newly_created {
            metrics::counter!("reservations_created_total").increment(1);
            tracing::info!(
                reservation_id = %line.reservation_id,
                quantity,
                "stock reserved"
            );
        }
        Ok(line)
    }

    async fn reserve_line_once(
        &self,
        order_id: OrderId,
        product_id: &ProductId,
        quantity: u32,
        ttl: Duration,
    ) -> Result<LineReservation> {
        let reservation_id = Reservation::stream_id(order_id, product_id);
        let reservation = self.reservations.load(reservation_id).await?;
        if reservation.id().is_some() {
            return Ok(LineReservation {
                reservation_id,
                product_id: product_id.clone(),
                quantity: reservation.quantity(),
                status: reservation.status(),
                newly_created: false,
            });
        }

        let stock_id = StockItem::stream_id(product_id);
        let item = self
            .stock
            .load_existing(stock_id)
            .await?
            .ok_or_else(|| SagaError::ProductNotFound(product_id.clone()))?;

        let stock_events = item.reserve(quantity).map_err(DomainError::from)?;
        let reservation_events = reservation
            .create(order_id, product_id.clone(), quantity, ttl, Utc::now())
            .map_err(DomainError::from)?;
        let item_after = item.with_events(&stock_events);

        let mut unit = UnitOfWork::new();
        unit.record(stock_id, &item, &stock_events)?;
        unit.record(reservation_id, &reservation, &reservation_events)?;
        unit.publish(&InventoryReserved {
            order_id,
            product_id: product_id.clone(),
            quantity,
            reservation_id: reservation_id.to_string(),
        })?;
        if let Some(alert) = LowStockAlert::from_stock_events(&item_after, &stock_events) {
            unit.publish(&alert)?;
        }
        unit.commit(&self.store).await?;
        note_low_stock(&item_after, &stock_events);

        Ok(LineReservation {
            reservation_id,
            product_id: product_id.clone(),
            quantity,
            status: ReservationStatus::Active,
            newly_created: true,
        })
    }

    /// Reserves every line of an order, or none.
    ///
    /// Lines for the same product are merged. If any line cannot be held,
    /// the order's ACTIVE lines are released again and a single
    /// `InventoryReservationFailed` naming every unavailable product is
    /// emitted.
    ///
    /// On redelivery a line whose reservation was already released or
    /// expired counts as unavailable: its stock went back to the item.
    #[tracing::instrument(skip(self, lines), fields(order_id = %order_id, lines = lines.len()))]
    pub async fn reserve_order(
        &self,
        order_id: OrderId,
        lines: &[OrderLine],
        ttl: Duration,
    ) -> Result<OrderReservation> {
        let lines = merge_lines(lines)?;

        let mut reserved = Vec::with_capacity(lines.len());
        let mut unavailable = Vec::new();
        let mut reasons = Vec::new();

        for line in &lines {
            match self
                .reserve_line(order_id, &line.product_id, line.quantity, ttl)
                .await
            {
                Ok(reservation) => match withdrawn_reason(reservation.status) {
                    Some(reason) => {
                        reasons.push(format!("{}: {reason}", line.product_id));
                        unavailable.push(line.product_id.clone());
                    }
                    None => reserved.push(reservation),
                },
                Err(e) if is_unavailability(&e) => {
                    reasons.push(format!("{}: {}", line.product_id, unavailability_reason(&e)));
                    unavailable.push(line.product_id.clone());
                }
                Err(e) => {
                    self.compensate(&reserved, "order reservation aborted").await;
                    return Err(e);
                }
            }
        }

        if unavailable.is_empty() {
            return Ok(OrderReservation {
                order_id,
                lines: reserved,
            });
        }

        self.compensate(&reserved, "order reservation incomplete")
            .await;

        let reason = reasons.join("; ");
        let mut unit = UnitOfWork::new();
        unit.publish(&InventoryReservationFailed {
            order_id,
            unavailable_products: unavailable.clone(),
            reason: reason.clone(),
        })?;
        unit.commit(&self.store).await?;

        metrics::counter!("reservations_failed_total").increment(1);
        tracing::warn!(unavailable = ?unavailable, %reason, "order reservation failed");

        Err(SagaError::ReservationFailed {
            order_id,
            unavailable_products: unavailable,
            reason,
        })
    }

    async fn compensate(&self, reserved: &[LineReservation], reason: &str) {
        for line in reserved
            .iter()
            .filter(|l| l.status == ReservationStatus::Active)
        {
            if let Err(e) = self.release(line.reservation_id, reason).await {
                tracing::error!(
                    reservation_id = %line.reservation_id,
                    error = %e,
                    "compensating release failed"
                );
            }
        }
    }

    /// Confirms an ACTIVE reservation before its deadline and moves its
    /// quantity out of the item's reserved balance. Confirming a confirmed
    /// reservation changes nothing.
    #[tracing::instrument(skip(self), fields(reservation_id = %reservation_id))]
    pub async fn confirm(&self, reservation_id: AggregateId) -> Result<Transition> {
        let transition = self
            .retrying(move || async move { self.confirm_once(reservation_id).await })
            .await?;
        if transition.is_applied() {
            tracing::info!("reservation confirmed");
        }
        Ok(transition)
    }

    async fn confirm_once(&self, reservation_id: AggregateId) -> Result<Transition> {
        let reservation = self.require_reservation(reservation_id).await?;
        if reservation.status() == ReservationStatus::Confirmed {
            return Ok(Transition::Unchanged(ReservationStatus::Confirmed));
        }
        let events = reservation.confirm(Utc::now()).map_err(DomainError::from)?;
        self.commit_with_stock(reservation_id, &reservation, &events, |item| {
            item.confirm(reservation.quantity())
        })
        .await?;
        Ok(Transition::Applied(ReservationStatus::Confirmed))
    }

    /// Releases an ACTIVE reservation and returns its quantity to the item.
    /// Terminal reservations are left as they are.
    #[tracing::instrument(skip(self), fields(reservation_id = %reservation_id))]
    pub async fn release(&self, reservation_id: AggregateId, reason: &str) -> Result<Transition> {
        let transition = self
            .retrying(move || async move { self.release_once(reservation_id, reason).await })
            .await?;
        if transition.is_applied() {
            tracing::info!(reason, "reservation released");
        }
        Ok(transition)
    }

    async fn release_once(&self, reservation_id: AggregateId, reason: &str) -> Result<Transition> {
        let reservation = self.require_reservation(reservation_id).await?;
        let events = reservation
            .release(Utc::now(), reason)
            .map_err(DomainError::from)?;
        if events.is_empty() {
            return Ok(Transition::Unchanged(reservation.status()));
        }
        self.commit_with_stock(reservation_id, &reservation, &events, |item| {
            item.release(reservation.quantity())
        })
        .await?;
        Ok(Transition::Applied(ReservationStatus::Released))
    }

    /// Expires an ACTIVE reservation whose deadline is at or before `now`,
    /// releasing its stock in the same commit. Anything else is skipped.
    #[tracing::instrument(skip(self), fields(reservation_id = %reservation_id))]
    pub async fn expire(&self, reservation_id: AggregateId, now: DateTime<Utc>) -> Result<Transition> {
        let transition = self
            .retrying(move || async move { self.expire_once(reservation_id, now).await })
            .await?;
        if transition.is_applied() {
            metrics::counter!("reservations_expired_total").increment(1);
            tracing::info!("reservation expired");
        }
        Ok(transition)
    }

    async fn expire_once(&self, reservation_id: AggregateId, now: DateTime<Utc>) -> Result<Transition> {
        let reservation = self.require_reservation(reservation_id).await?;
        if !reservation.is_expired(now) || reservation.status() != ReservationStatus::Active {
            return Ok(Transition::Unchanged(reservation.status()));
        }
        let events = reservation.expire(now).map_err(DomainError::from)?;
        self.commit_with_stock(reservation_id, &reservation, &events, |item| {
            item.release(reservation.quantity())
        })
        .await?;
        Ok(Transition::Applied(ReservationStatus::Expired))
    }

    /// Confirms every ACTIVE reservation of an order.
    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn confirm_order(&self, order_id: OrderId) -> Result<OrderOutcome> {
        let mut outcome = OrderOutcome::default();
        for summary in self.read.reservations_for_order(order_id).await? {
            match self.confirm(summary.reservation_id).await {
                Ok(t) => outcome.record(t),
                Err(e) if e.kind() == ErrorKind::BusinessRule => {
                    tracing::warn!(
                        reservation_id = %summary.reservation_id,
                        error = %e,
                        "reservation could not be confirmed"
                    );
                    outcome.refused.push((summary.product_id, e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(outcome)
    }

    /// Releases every ACTIVE reservation of an order.
    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn release_order(&self, order_id: OrderId, reason: &str) -> Result<OrderOutcome> {
        let mut outcome = OrderOutcome::default();
        for summary in self.read.reservations_for_order(order_id).await? {
            outcome.record(self.release(summary.reservation_id, reason).await?);
        }
        Ok(outcome)
    }

    async fn require_reservation(&self, reservation_id: AggregateId) -> Result<Reservation> {
        self.reservations
            .load_existing(reservation_id)
            .await?
            .ok_or(SagaError::ReservationNotFound(reservation_id))
    }

    /// Stores reservation `events` together with the stock movement
    /// `stock_fn` decides on the reservation's item.
    async fn commit_with_stock<F>(
        &self,
        reservation_id: AggregateId,
        reservation: &Reservation,
        events: &[domain::ReservationEvent],
        stock_fn: F,
    ) -> Result<()>
    where
        F: FnOnce(&StockItem) -> std::result::Result<Vec<domain::StockEvent>, domain::StockError>,
    {
        let product_id = reservation
            .product_id()
            .ok_or(SagaError::ReservationNotFound(reservation_id))?;
        let stock_id = StockItem::stream_id(product_id);
        let item = self
            .stock
            .load_existing(stock_id)
            .await?
            .ok_or_else(|| SagaError::ProductNotFound(product_id.clone()))?;
        let stock_events = stock_fn(&item).map_err(DomainError::from)?;

        let mut unit = UnitOfWork::new();
        unit.record(stock_id, &item, &stock_events)?;
        unit.record(reservation_id, reservation, events)?;
        unit.commit(&self.store).await?;
        Ok(())
    }

    async fn retrying<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry_on_conflict(&self.retry, || {
            let attempt = operation();
            async move {
                let result = attempt.await;
                if matches!(&result, Err(e) if e.is_retryable()) {
                    metrics::counter!("reservation_commit_conflicts_total").increment(1);
                }
                result
            }
        })
        .await
    }
}

impl OrderOutcome {
    fn record(&mut self, transition: Transition) {
        if transition.is_applied() {
            self.applied += 1;
        } else {
            self.unchanged += 1;
        }
    }
}

/// Validates and merges lines per product, keeping first-seen order.
fn merge_lines(lines: &[OrderLine]) -> Result<Vec<OrderLine>> {
    if lines.is_empty() {
        return Err(SagaError::Validation("order has no lines".into()));
    }
    let mut merged: Vec<OrderLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity == 0 {
            return Err(SagaError::Validation(format!(
                "quantity for {} must be greater than 0",
                line.product_id
            )));
        }
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => existing.quantity += line.quantity,
            None => merged.push(line.clone()),
        }
    }
    Ok(merged)
}

/// Why an existing line no longer holds stock, if it doesn't.
fn withdrawn_reason(status: ReservationStatus) -> Option<&'static str> {
    match status {
        ReservationStatus::Released => Some("reservation released"),
        ReservationStatus::Expired => Some("reservation expired"),
        ReservationStatus::Active | ReservationStatus::Confirmed => None,
    }
}

/// Refusals that mean "this product cannot be held right now".
fn is_unavailability(error: &SagaError) -> bool {
    matches!(error, SagaError::ProductNotFound(_))
        || matches!(error.kind(), ErrorKind::BusinessRule)
}

fn unavailability_reason(error: &SagaError) -> String {
    match error {
        SagaError::Domain(inner) => match inner {
            DomainError::Stock(stock) => stock.to_string(),
            other => other.to_string(),
        },
        SagaError::ProductNotFound(_) => "product not registered".to_string(),
        other => other.to_string(),
    }
}
