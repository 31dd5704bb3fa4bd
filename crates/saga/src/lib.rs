//! Coordination of stock reservations and payments.
//!
//! This crate provides:
//! - `ReservationCoordinator`: reserve, confirm, release and expire, each as
//!   one commit over the stock item and the reservation
//! - `ExpirySweeper`: the periodic job reclaiming stock from overdue holds
//! - `PaymentOrchestrator`: fraud check, then gateway settlement
//! - `OutboxRelay` and the `EventBus` seam for at-least-once delivery
//! - `InventoryEventHandler`: reactions to order and payment events

pub mod error;
pub mod handlers;
pub mod messaging;
pub mod outbox;
pub mod payments;
pub mod read_side;
pub mod reservations;
pub mod services;
pub mod sweeper;

pub use error::{Result, SagaError};
pub use handlers::{Handled, InventoryEventHandler};
pub use messaging::{BusError, EventBus, InMemoryEventBus, LoggingEventBus, PublishedMessage};
pub use outbox::{DrainReport, OutboxRelay};
pub use payments::{PaymentOrchestrator, ProcessPaymentRequest};
pub use read_side::ReadModels;
pub use reservations::{
    LineReservation, OrderOutcome, OrderReservation, ReservationCoordinator, Transition,
};
pub use services::{
    ChargeOutcome, FraudCheck, FraudCheckError, GatewayError, InMemoryPaymentGateway,
    PaymentGateway, RuleBasedFraudCheck, StaticFraudCheck,
};
pub use sweeper::{ExpirySweeper, SweepReport};
