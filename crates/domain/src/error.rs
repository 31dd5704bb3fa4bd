//! Domain error types.

use event_store::EventStoreError;
use thiserror::Error;

use crate::inventory::StockError;
use crate::payment::PaymentError;
use crate::reservation::ReservationError;

/// Broad error classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input, rejected before touching the store.
    Validation,
    /// A definitive business rule refusal; never retried.
    BusinessRule,
    /// Lost an optimistic-concurrency race; retry the whole read-modify-write.
    Conflict,
    /// An external capability failed or is unavailable.
    External,
    /// The addressed entity does not exist.
    NotFound,
    /// Storage or serialization failure.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::BusinessRule => "business_rule",
            ErrorKind::Conflict => "conflict",
            ErrorKind::External => "external",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Stock error: {0}")]
    Stock(#[from] StockError),

    #[error("Reservation error: {0}")]
    Reservation(#[from] ReservationError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::EventStore(e) if e.is_conflict() => ErrorKind::Conflict,
            DomainError::EventStore(_) => ErrorKind::Internal,
            DomainError::Stock(e) => e.kind(),
            DomainError::Reservation(e) => e.kind(),
            DomainError::Payment(e) => e.kind(),
            DomainError::AggregateNotFound { .. } => ErrorKind::NotFound,
            DomainError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Returns true for a lost optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::AggregateId;
    use event_store::Version;

    #[test]
    fn store_conflicts_are_classified_as_conflict() {
        let err = DomainError::from(EventStoreError::ConcurrencyConflict {
            aggregate_id: AggregateId::new(),
            expected: Version::first(),
            actual: Version::new(2),
        });
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_conflict());
    }

    #[test]
    fn stock_shortage_is_a_business_rule() {
        let err = DomainError::from(StockError::InsufficientStock {
            available: 1,
            requested: 2,
        });
        assert_eq!(err.kind(), ErrorKind::BusinessRule);
        assert!(!err.is_conflict());
    }

    #[test]
    fn missing_aggregate_is_not_found() {
        let err = DomainError::AggregateNotFound {
            aggregate_type: "Payment",
            aggregate_id: "pi_1".into(),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.kind().to_string(), "not_found");
    }
}
