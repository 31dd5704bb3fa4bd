//! Payment state machine.

use serde::{Deserialize, Serialize};

use super::PaymentError;

/// The status of a payment.
///
/// State transitions:
/// ```text
/// Pending ──► Processing ──┬──► Completed ──► PartiallyRefunded ──► Refunded
///    │            │        │        └──────────────────────────────────▲
///    │            │        └──► Failed
///    └────────────┴──────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing | Cancelled)
                | (Processing, Completed | Failed | Cancelled)
                | (Failed, Cancelled)
                | (Completed, Refunded | PartiallyRefunded)
                | (PartiallyRefunded, Refunded | PartiallyRefunded)
        )
    }

    /// Consulted before every mutation.
    pub fn validate_transition(&self, next: PaymentStatus) -> Result<(), PaymentError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(PaymentError::IllegalPaymentState {
                current: *self,
                attempted: next,
            })
        }
    }

    /// No further transitions possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Cancelled | PaymentStatus::Refunded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
