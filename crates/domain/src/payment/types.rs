//! Payment value types.

use common::AggregateId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public identifier of a payment intent, e.g. `pi_3f2a...`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentIntentId(String);

impl PaymentIntentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh `pi_<32 hex>` id.
    pub fn generate() -> Self {
        Self(format!("pi_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stream id of the payment this intent identifies.
    pub fn stream_id(&self) -> AggregateId {
        AggregateId::derived("payment", &self.0)
    }
}

impl std::fmt::Display for PaymentIntentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PaymentIntentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of instrument the customer pays with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[default]
    CreditCard,
    DebitCard,
    BankTransfer,
    DigitalWallet,
    Paypal,
    ApplePay,
    GooglePay,
    Cryptocurrency,
}

/// Outcome class of a fraud check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudVerdict {
    Approve,
    Review,
    Decline,
}

impl FraudVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            FraudVerdict::Approve => "APPROVE",
            FraudVerdict::Review => "REVIEW",
            FraudVerdict::Decline => "DECLINE",
        }
    }
}

impl std::fmt::Display for FraudVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a fraud check, recorded on the payment as advisory data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudAssessment {
    /// Risk score in `[0, 1]`.
    pub score: f64,
    pub verdict: FraudVerdict,
    pub is_high_risk: bool,
    pub reason: Option<String>,
}

impl FraudAssessment {
    /// An assessment from a score, high risk above `threshold`.
    pub fn from_score(score: f64, threshold: f64, reason: Option<String>) -> Self {
        let is_high_risk = score > threshold;
        let verdict = if is_high_risk {
            FraudVerdict::Decline
        } else if score > threshold / 2.0 {
            FraudVerdict::Review
        } else {
            FraudVerdict::Approve
        };
        Self {
            score,
            verdict,
            is_high_risk,
            reason,
        }
    }
}
