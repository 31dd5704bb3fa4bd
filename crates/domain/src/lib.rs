//! Domain layer for stock and payment coordination.
//!
//! This crate provides:
//! - Aggregate and DomainEvent traits, CommandHandler and UnitOfWork
//! - Conflict retry for optimistic read-modify-write operations
//! - The StockItem ledger, the Reservation lifecycle and the Payment state machine
//! - Integration event contracts written through the outbox

pub mod aggregate;
pub mod command;
pub mod contracts;
pub mod error;
pub mod inventory;
pub mod payment;
pub mod reservation;
pub mod retry;
pub mod unit_of_work;
pub mod value_objects;

pub use aggregate::{Aggregate, DomainEvent};
pub use command::{CommandHandler, CommandResult};
pub use contracts::IntegrationEvent;
pub use error::{DomainError, ErrorKind};
pub use inventory::{InventoryService, RegisterStockItem, StockError, StockEvent, StockItem, StockLevel};
pub use payment::{
    FraudAssessment, FraudVerdict, InitiatePayment, Payment, PaymentError, PaymentEvent,
    PaymentIntentId, PaymentMethod, PaymentService, PaymentStatus,
};
pub use reservation::{Reservation, ReservationError, ReservationEvent, ReservationStatus};
pub use retry::{ConflictAware, RetryPolicy, retry_on_conflict};
pub use unit_of_work::UnitOfWork;
pub use value_objects::{CustomerId, Money, OrderId, OrderLine, ProductId};
