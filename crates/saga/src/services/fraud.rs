//! Fraud check capability.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{FraudAssessment, Money, Payment};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::payments::ProcessPaymentRequest;

#[derive(Debug, Clone, Error)]
pub enum FraudCheckError {
    #[error("fraud service unavailable: {0}")]
    Unavailable(String),
}

/// Scores a payment before it reaches the gateway.
#[async_trait]
pub trait FraudCheck: Send + Sync {
    async fn check(
        &self,
        payment: &Payment,
        request: &ProcessPaymentRequest,
    ) -> Result<FraudAssessment, FraudCheckError>;
}

#[async_trait]
impl<F: FraudCheck + ?Sized> FraudCheck for Arc<F> {
    async fn check(
        &self,
        payment: &Payment,
        request: &ProcessPaymentRequest,
    ) -> Result<FraudAssessment, FraudCheckError> {
        (**self).check(payment, request).await
    }
}

/// Additive scoring over a few request signals.
#[derive(Debug, Clone)]
pub struct RuleBasedFraudCheck {
    threshold: f64,
    large_amount: Money,
}

impl RuleBasedFraudCheck {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            large_amount: Money::from_dollars(5_000),
        }
    }

    /// Amount at or above which a payment counts as large.
    pub fn with_large_amount(mut self, amount: Money) -> Self {
        self.large_amount = amount;
        self
    }
}

impl Default for RuleBasedFraudCheck {
    fn default() -> Self {
        Self::new(0.7)
    }
}

#[async_trait]
impl FraudCheck for RuleBasedFraudCheck {
    async fn check(
        &self,
        payment: &Payment,
        request: &ProcessPaymentRequest,
    ) -> Result<FraudAssessment, FraudCheckError> {
        let mut score: f64 = 0.05;
        let mut signals = Vec::new();

        if payment.amount().cents() >= self.large_amount.cents() {
            score += 0.4;
            signals.push("large amount");
        }
        let ip = request.ip_address.as_deref().or(payment.ip_address());
        if ip.is_none() {
            score += 0.2;
            signals.push("no client address");
        }
        if request.cvv.as_deref().is_none_or(str::is_empty) {
            score += 0.15;
            signals.push("no card verification");
        }
        if let (Some(requested), Some(on_file)) =
            (request.ip_address.as_deref(), payment.ip_address())
        {
            if requested != on_file {
                score += 0.25;
                signals.push("client address changed since intent");
            }
        }

        let reason = (!signals.is_empty()).then(|| signals.join(", "));
        Ok(FraudAssessment::from_score(
            score.min(1.0),
            self.threshold,
            reason,
        ))
    }
}

#[derive(Debug)]
enum StaticBehavior {
    Score { score: f64, reason: Option<String> },
    Unavailable(String),
}

/// Returns a configured score, or fails. For tests and local runs.
#[derive(Debug, Clone)]
pub struct StaticFraudCheck {
    threshold: f64,
    behavior: Arc<RwLock<StaticBehavior>>,
}

impl StaticFraudCheck {
    pub fn new(score: f64) -> Self {
        Self {
            threshold: 0.7,
            behavior: Arc::new(RwLock::new(StaticBehavior::Score {
                score,
                reason: None,
            })),
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub async fn set_score(&self, score: f64, reason: Option<&str>) {
        *self.behavior.write().await = StaticBehavior::Score {
            score,
            reason: reason.map(str::to_string),
        };
    }

    pub async fn set_unavailable(&self, message: &str) {
        *self.behavior.write().await = StaticBehavior::Unavailable(message.to_string());
    }
}

#[async_trait]
impl FraudCheck for StaticFraudCheck {
    async fn check(
        &self,
        _payment: &Payment,
        _request: &ProcessPaymentRequest,
    ) -> Result<FraudAssessment, FraudCheckError> {
        match &*self.behavior.read().await {
            StaticBehavior::Score { score, reason } => Ok(FraudAssessment::from_score(
                *score,
                self.threshold,
                reason.clone(),
            )),
            StaticBehavior::Unavailable(message) => {
                Err(FraudCheckError::Unavailable(message.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{Aggregate, CustomerId, FraudVerdict, InitiatePayment, OrderId, PaymentIntentId};

    fn payment(amount: Money, ip: Option<&str>) -> Payment {
        let mut cmd = InitiatePayment::new(OrderId::new(), CustomerId::new(), amount);
        if let Some(ip) = ip {
            cmd = cmd.with_client(ip, "test-agent");
        }
        let payment = Payment::default();
        payment.with_events(
            &payment
                .initiate(PaymentIntentId::new("pi_test"), &cmd, Utc::now())
                .unwrap(),
        )
    }

    fn request(ip: Option<&str>, cvv: Option<&str>) -> ProcessPaymentRequest {
        ProcessPaymentRequest {
            payment_intent_id: PaymentIntentId::new("pi_test"),
            payment_method_id: "pm_card".into(),
            cvv: cvv.map(str::to_string),
            ip_address: ip.map(str::to_string),
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn ordinary_payment_is_approved() {
        let check = RuleBasedFraudCheck::default();
        let assessment = check
            .check(
                &payment(Money::from_dollars(40), Some("10.0.0.1")),
                &request(Some("10.0.0.1"), Some("123")),
            )
            .await
            .unwrap();
        assert_eq!(assessment.verdict, FraudVerdict::Approve);
        assert!(!assessment.is_high_risk);
        assert!(assessment.reason.is_none());
    }

    #[tokio::test]
    async fn stacked_signals_become_high_risk() {
        let check = RuleBasedFraudCheck::default();
        let assessment = check
            .check(
                &payment(Money::from_dollars(9_000), Some("10.0.0.1")),
                &request(Some("192.168.1.9"), None),
            )
            .await
            .unwrap();
        assert!(assessment.is_high_risk);
        assert_eq!(assessment.verdict, FraudVerdict::Decline);
        let reason = assessment.reason.unwrap();
        assert!(reason.contains("large amount"));
        assert!(reason.contains("client address changed"));
    }

    #[tokio::test]
    async fn static_check_can_fail() {
        let check = StaticFraudCheck::new(0.1);
        let p = payment(Money::from_dollars(1), None);
        let r = request(None, None);
        assert!(!check.check(&p, &r).await.unwrap().is_high_risk);

        check.set_score(0.95, Some("blocklisted card")).await;
        let assessment = check.check(&p, &r).await.unwrap();
        assert!(assessment.is_high_risk);
        assert_eq!(assessment.reason.as_deref(), Some("blocklisted card"));

        check.set_unavailable("timeout").await;
        assert!(check.check(&p, &r).await.is_err());
    }
}
