//! Coordination error types.

use common::AggregateId;
use domain::{ConflictAware, DomainError, ErrorKind, OrderId, PaymentIntentId, ProductId};
use event_store::EventStoreError;
use projections::ProjectionError;
use thiserror::Error;

use crate::messaging::BusError;
use crate::services::FraudCheckError;

/// Errors that can occur while coordinating reservations and payments.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Rejected input.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Payment not found: {0}")]
    PaymentNotFound(PaymentIntentId),

    #[error("Reservation not found: {0}")]
    ReservationNotFound(AggregateId),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The fraud check marked the payment high risk.
    #[error("Payment blocked due to fraud detection: {reason}")]
    FraudBlocked { reason: String, score: f64 },

    /// At least one line of an order could not be reserved.
    #[error("Reservation failed for order {order_id}: {reason}")]
    ReservationFailed {
        order_id: OrderId,
        unavailable_products: Vec<ProductId>,
        reason: String,
    },

    #[error("Fraud check unavailable: {0}")]
    FraudCheck(#[from] FraudCheckError),

    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Read model error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SagaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SagaError::Validation(_) => ErrorKind::Validation,
            SagaError::PaymentNotFound(_)
            | SagaError::ReservationNotFound(_)
            | SagaError::ProductNotFound(_) => ErrorKind::NotFound,
            SagaError::FraudBlocked { .. } | SagaError::ReservationFailed { .. } => {
                ErrorKind::BusinessRule
            }
            SagaError::FraudCheck(_) | SagaError::Bus(_) => ErrorKind::External,
            SagaError::Domain(e) => e.kind(),
            SagaError::EventStore(e) if e.is_conflict() => ErrorKind::Conflict,
            SagaError::EventStore(_) | SagaError::Projection(_) | SagaError::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Only lost concurrency races are worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

impl ConflictAware for SagaError {
    fn is_conflict(&self) -> bool {
        self.is_retryable()
    }
}

/// Convenience type alias for coordination results.
pub type Result<T> = std::result::Result<T, SagaError>;
