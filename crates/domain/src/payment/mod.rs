//! Payment aggregate and related types.

mod aggregate;
mod events;
mod service;
mod status;
mod types;

pub use aggregate::Payment;
pub use events::{
    PaymentCancelledData, PaymentCompletedData, PaymentEvent, PaymentFailedData,
    PaymentInitiatedData, PaymentRefundedData, ProcessingStartedData,
};
pub use service::PaymentService;
pub use status::PaymentStatus;
pub use types::{FraudAssessment, FraudVerdict, PaymentIntentId, PaymentMethod};

use thiserror::Error;

use crate::error::ErrorKind;
use crate::value_objects::{CustomerId, Money, OrderId};

/// Command to open a payment intent for an order.
#[derive(Debug, Clone)]
pub struct InitiatePayment {
    /// Generated when not given.
    pub payment_intent_id: Option<PaymentIntentId>,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub payment_method_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl InitiatePayment {
    pub fn new(order_id: OrderId, customer_id: CustomerId, amount: Money) -> Self {
        Self {
            payment_intent_id: None,
            order_id,
            customer_id,
            amount,
            method: PaymentMethod::default(),
            payment_method_id: None,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn with_intent_id(mut self, id: PaymentIntentId) -> Self {
        self.payment_intent_id = Some(id);
        self
    }

    pub fn with_method(mut self, method: PaymentMethod, method_id: impl Into<String>) -> Self {
        self.method = method;
        self.payment_method_id = Some(method_id.into());
        self
    }

    pub fn with_client(mut self, ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Errors that can occur during payment operations.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment already initiated")]
    AlreadyInitiated,

    #[error("Payment not initiated")]
    NotInitiated,

    #[error("Invalid amount: {0} (must be greater than 0)")]
    InvalidAmount(Money),

    #[error("Invalid fraud score: {0} (must be within 0..=1)")]
    InvalidFraudScore(f64),

    #[error("Illegal payment state: cannot move from {current} to {attempted}")]
    IllegalPaymentState {
        current: PaymentStatus,
        attempted: PaymentStatus,
    },

    #[error("Refund of {requested} exceeds remaining {remaining}")]
    RefundExceedsAmount { requested: Money, remaining: Money },
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::InvalidAmount(_) | PaymentError::InvalidFraudScore(_) => {
                ErrorKind::Validation
            }
            PaymentError::NotInitiated => ErrorKind::NotFound,
            PaymentError::AlreadyInitiated
            | PaymentError::IllegalPaymentState { .. }
            | PaymentError::RefundExceedsAmount { .. } => ErrorKind::BusinessRule,
        }
    }
}
