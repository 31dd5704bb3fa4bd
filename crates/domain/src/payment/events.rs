//! Payment domain events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::value_objects::{CustomerId, Money, OrderId};

use super::{FraudAssessment, PaymentIntentId, PaymentMethod, PaymentStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PaymentEvent {
    PaymentInitiated(PaymentInitiatedData),

    /// Advisory; does not change the status.
    FraudScoreRecorded(FraudAssessment),

    PaymentProcessingStarted(ProcessingStartedData),
    PaymentCompleted(PaymentCompletedData),
    PaymentFailed(PaymentFailedData),
    PaymentCancelled(PaymentCancelledData),
    PaymentRefunded(PaymentRefundedData),
}

impl DomainEvent for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::PaymentInitiated(_) => "PaymentInitiated",
            PaymentEvent::FraudScoreRecorded(_) => "FraudScoreRecorded",
            PaymentEvent::PaymentProcessingStarted(_) => "PaymentProcessingStarted",
            PaymentEvent::PaymentCompleted(_) => "PaymentCompleted",
            PaymentEvent::PaymentFailed(_) => "PaymentFailed",
            PaymentEvent::PaymentCancelled(_) => "PaymentCancelled",
            PaymentEvent::PaymentRefunded(_) => "PaymentRefunded",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInitiatedData {
    pub payment_intent_id: PaymentIntentId,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub payment_method_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub initiated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStartedData {
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCompletedData {
    pub transaction_id: String,
    pub gateway_response: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailedData {
    pub reason: String,
    pub gateway_response: Option<String>,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCancelledData {
    pub reason: Option<String>,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRefundedData {
    pub amount: Money,
    pub refunded_total: Money,
    pub status_after: PaymentStatus,
    pub refunded_at: DateTime<Utc>,
}
