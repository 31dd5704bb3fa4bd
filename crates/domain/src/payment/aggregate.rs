//! Payment aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::value_objects::{CustomerId, Money, OrderId};

use super::events::{
    PaymentCancelledData, PaymentCompletedData, PaymentFailedData, PaymentInitiatedData,
    PaymentRefundedData, ProcessingStartedData,
};
use super::{
    FraudAssessment, InitiatePayment, PaymentError, PaymentEvent, PaymentIntentId,
    PaymentMethod, PaymentStatus,
};

/// One attempt to collect money for an order.
///
/// `refunded_amount` never exceeds `amount` and never decreases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Payment {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    intent_id: Option<PaymentIntentId>,
    order_id: Option<OrderId>,
    customer_id: Option<CustomerId>,
    amount: Money,
    method: PaymentMethod,
    payment_method_id: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    status: PaymentStatus,
    fraud: Option<FraudAssessment>,
    refunded_amount: Money,
    gateway_transaction_id: Option<String>,
    gateway_response: Option<String>,
    failure_reason: Option<String>,
    cancellation_reason: Option<String>,
    created_at: Option<DateTime<Utc>>,
    processed_at: Option<DateTime<Utc>>,
}

impl Aggregate for Payment {
    type Event = PaymentEvent;
    type Error = PaymentError;

    fn aggregate_type() -> &'static str {
        "Payment"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            PaymentEvent::PaymentInitiated(data) => self.apply_initiated(data),
            PaymentEvent::FraudScoreRecorded(assessment) => self.fraud = Some(assessment),
            PaymentEvent::PaymentProcessingStarted(_) => self.status = PaymentStatus::Processing,
            PaymentEvent::PaymentCompleted(data) => {
                self.status = PaymentStatus::Completed;
                self.gateway_transaction_id = Some(data.transaction_id);
                self.gateway_response = Some(data.gateway_response);
                self.processed_at = Some(data.completed_at);
            }
            PaymentEvent::PaymentFailed(data) => {
                self.status = PaymentStatus::Failed;
                self.failure_reason = Some(data.reason);
                self.gateway_response = data.gateway_response;
                self.processed_at = Some(data.failed_at);
            }
            PaymentEvent::PaymentCancelled(data) => {
                self.status = PaymentStatus::Cancelled;
                self.cancellation_reason = data.reason;
            }
            PaymentEvent::PaymentRefunded(data) => {
                self.status = data.status_after;
                self.refunded_amount = data.refunded_total;
            }
        }
    }
}

// Query methods
impl Payment {
    pub fn intent_id(&self) -> Option<&PaymentIntentId> {
        self.intent_id.as_ref()
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn payment_method_id(&self) -> Option<&str> {
        self.payment_method_id.as_deref()
    }

    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn fraud_assessment(&self) -> Option<&FraudAssessment> {
        self.fraud.as_ref()
    }

    pub fn fraud_score(&self) -> Option<f64> {
        self.fraud.as_ref().map(|f| f.score)
    }

    pub fn refunded_amount(&self) -> Money {
        self.refunded_amount
    }

    pub fn gateway_transaction_id(&self) -> Option<&str> {
        self.gateway_transaction_id.as_deref()
    }

    pub fn gateway_response(&self) -> Option<&str> {
        self.gateway_response.as_deref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }

    /// Only a PENDING payment can be sent to the gateway.
    pub fn is_processable(&self) -> bool {
        self.id.is_some() && self.status == PaymentStatus::Pending
    }

    pub fn is_refundable(&self) -> bool {
        matches!(
            self.status,
            PaymentStatus::Completed | PaymentStatus::PartiallyRefunded
        )
    }

    pub fn available_refund_amount(&self) -> Money {
        self.amount - self.refunded_amount
    }

    pub fn is_high_risk(&self, threshold: f64) -> bool {
        self.fraud_score().is_some_and(|score| score > threshold)
    }
}

// Command methods (return events)
impl Payment {
    pub fn initiate(
        &self,
        intent_id: PaymentIntentId,
        cmd: &InitiatePayment,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentEvent>, PaymentError> {
        if self.id.is_some() {
            return Err(PaymentError::AlreadyInitiated);
        }
        if !cmd.amount.is_positive() {
            return Err(PaymentError::InvalidAmount(cmd.amount));
        }

        Ok(vec![PaymentEvent::PaymentInitiated(PaymentInitiatedData {
            payment_intent_id: intent_id,
            order_id: cmd.order_id,
            customer_id: cmd.customer_id,
            amount: cmd.amount,
            method: cmd.method,
            payment_method_id: cmd.payment_method_id.clone(),
            ip_address: cmd.ip_address.clone(),
            user_agent: cmd.user_agent.clone(),
            initiated_at: now,
        })])
    }

    /// Attaches a fraud assessment. Does not change the status.
    pub fn set_fraud_score(
        &self,
        assessment: FraudAssessment,
    ) -> Result<Vec<PaymentEvent>, PaymentError> {
        self.ensure_initiated()?;
        if !(0.0..=1.0).contains(&assessment.score) {
            return Err(PaymentError::InvalidFraudScore(assessment.score));
        }
        Ok(vec![PaymentEvent::FraudScoreRecorded(assessment)])
    }

    pub fn mark_processing(&self, now: DateTime<Utc>) -> Result<Vec<PaymentEvent>, PaymentError> {
        self.ensure_initiated()?;
        self.status.validate_transition(PaymentStatus::Processing)?;
        Ok(vec![PaymentEvent::PaymentProcessingStarted(
            ProcessingStartedData { started_at: now },
        )])
    }

    pub fn mark_completed(
        &self,
        transaction_id: impl Into<String>,
        gateway_response: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentEvent>, PaymentError> {
        self.ensure_initiated()?;
        self.status.validate_transition(PaymentStatus::Completed)?;
        Ok(vec![PaymentEvent::PaymentCompleted(PaymentCompletedData {
            transaction_id: transaction_id.into(),
            gateway_response: gateway_response.into(),
            completed_at: now,
        })])
    }

    pub fn mark_failed(
        &self,
        reason: impl Into<String>,
        gateway_response: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentEvent>, PaymentError> {
        self.ensure_initiated()?;
        self.status.validate_transition(PaymentStatus::Failed)?;
        Ok(vec![PaymentEvent::PaymentFailed(PaymentFailedData {
            reason: reason.into(),
            gateway_response,
            failed_at: now,
        })])
    }

    pub fn mark_cancelled(
        &self,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentEvent>, PaymentError> {
        self.ensure_initiated()?;
        self.status.validate_transition(PaymentStatus::Cancelled)?;
        Ok(vec![PaymentEvent::PaymentCancelled(PaymentCancelledData {
            reason,
            cancelled_at: now,
        })])
    }

    /// Refunds `amount`. REFUNDED when nothing remains afterwards,
    /// PARTIALLY_REFUNDED otherwise.
    pub fn process_refund(
        &self,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentEvent>, PaymentError> {
        self.ensure_initiated()?;
        if !amount.is_positive() {
            return Err(PaymentError::InvalidAmount(amount));
        }
        if !matches!(
            self.status,
            PaymentStatus::Completed | PaymentStatus::PartiallyRefunded | PaymentStatus::Refunded
        ) {
            return Err(PaymentError::IllegalPaymentState {
                current: self.status,
                attempted: PaymentStatus::Refunded,
            });
        }

        let remaining = self.available_refund_amount();
        if amount > remaining {
            return Err(PaymentError::RefundExceedsAmount {
                requested: amount,
                remaining,
            });
        }

        let refunded_total = self.refunded_amount + amount;
        let status_after = if refunded_total == self.amount {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartiallyRefunded
        };
        self.status.validate_transition(status_after)?;

        Ok(vec![PaymentEvent::PaymentRefunded(PaymentRefundedData {
            amount,
            refunded_total,
            status_after,
            refunded_at: now,
        })])
    }

    fn ensure_initiated(&self) -> Result<(), PaymentError> {
        if self.id.is_none() {
            return Err(PaymentError::NotInitiated);
        }
        Ok(())
    }
}

// Apply event helpers
impl Payment {
    fn apply_initiated(&mut self, data: PaymentInitiatedData) {
        self.id = Some(data.payment_intent_id.stream_id());
        self.intent_id = Some(data.payment_intent_id);
        self.order_id = Some(data.order_id);
        self.customer_id = Some(data.customer_id);
        self.amount = data.amount;
        self.method = data.method;
        self.payment_method_id = data.payment_method_id;
        self.ip_address = data.ip_address;
        self.user_agent = data.user_agent;
        self.status = PaymentStatus::Pending;
        self.created_at = Some(data.initiated_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(amount_cents: i64) -> Payment {
        let mut payment = Payment::default();
        let cmd = InitiatePayment::new(OrderId::new(), CustomerId::new(), Money::from_cents(amount_cents));
        let events = payment
            .initiate(PaymentIntentId::new("pi_test"), &cmd, Utc::now())
            .unwrap();
        payment.apply_events(events);
        payment
    }

    fn step(payment: &mut Payment, events: Result<Vec<PaymentEvent>, PaymentError>) {
        payment.apply_events(events.unwrap());
    }

    fn completed(amount_cents: i64) -> Payment {
        let mut payment = pending(amount_cents);
        let now = Utc::now();
        let events = payment.mark_processing(now);
        step(&mut payment, events);
        let events = payment.mark_completed("tx1", "ok", now);
        step(&mut payment, events);
        payment
    }

    #[test]
    fn initiate_sets_pending() {
        let payment = pending(100);
        assert_eq!(payment.status(), PaymentStatus::Pending);
        assert_eq!(payment.id(), Some(PaymentIntentId::new("pi_test").stream_id()));
        assert!(payment.is_processable());
        assert!(!payment.is_refundable());
    }

    #[test]
    fn initiate_rejects_non_positive_amount_and_duplicates() {
        let cmd = InitiatePayment::new(OrderId::new(), CustomerId::new(), Money::zero());
        assert!(matches!(
            Payment::default().initiate(PaymentIntentId::generate(), &cmd, Utc::now()),
            Err(PaymentError::InvalidAmount(_))
        ));

        let payment = pending(100);
        let cmd = InitiatePayment::new(OrderId::new(), CustomerId::new(), Money::from_cents(1));
        assert!(matches!(
            payment.initiate(PaymentIntentId::generate(), &cmd, Utc::now()),
            Err(PaymentError::AlreadyInitiated)
        ));
    }

    #[test]
    fn completing_without_processing_is_illegal() {
        let payment = pending(100);
        assert!(matches!(
            payment.mark_completed("tx", "ok", Utc::now()),
            Err(PaymentError::IllegalPaymentState {
                current: PaymentStatus::Pending,
                attempted: PaymentStatus::Completed
            })
        ));
    }

    #[test]
    fn refund_scenario() {
        let mut payment = completed(100);
        let now = Utc::now();
        assert_eq!(payment.gateway_transaction_id(), Some("tx1"));

        let events = payment.process_refund(Money::from_cents(40), now);
        step(&mut payment, events);
        assert_eq!(payment.status(), PaymentStatus::PartiallyRefunded);
        assert_eq!(payment.refunded_amount().cents(), 40);
        assert_eq!(payment.available_refund_amount().cents(), 60);

        let events = payment.process_refund(Money::from_cents(60), now);
        step(&mut payment, events);
        assert_eq!(payment.status(), PaymentStatus::Refunded);
        assert_eq!(payment.refunded_amount().cents(), 100);

        assert!(matches!(
            payment.process_refund(Money::from_cents(1), now),
            Err(PaymentError::RefundExceedsAmount { .. })
        ));
    }

    #[test]
    fn refund_beyond_remaining_fails() {
        let payment = completed(100);
        assert!(matches!(
            payment.process_refund(Money::from_cents(101), Utc::now()),
            Err(PaymentError::RefundExceedsAmount { .. })
        ));
    }

    #[test]
    fn refund_requires_settled_payment() {
        let payment = pending(100);
        assert!(matches!(
            payment.process_refund(Money::from_cents(10), Utc::now()),
            Err(PaymentError::IllegalPaymentState { .. })
        ));
        assert!(matches!(
            completed(100).process_refund(Money::zero(), Utc::now()),
            Err(PaymentError::InvalidAmount(_))
        ));
    }

    #[test]
    fn failed_payment_can_only_be_cancelled() {
        let mut payment = pending(100);
        let now = Utc::now();
        let events = payment.mark_processing(now);
        step(&mut payment, events);
        let events = payment.mark_failed("Card declined", Some("51".into()), now);
        step(&mut payment, events);
        assert_eq!(payment.failure_reason(), Some("Card declined"));

        assert!(payment.mark_completed("tx", "ok", now).is_err());
        assert!(payment.process_refund(Money::from_cents(1), now).is_err());
        let events = payment.mark_cancelled(None, now);
        step(&mut payment, events);
        assert_eq!(payment.status(), PaymentStatus::Cancelled);
    }

    #[test]
    fn fraud_score_is_advisory() {
        let mut payment = pending(100);
        let events = payment.set_fraud_score(FraudAssessment::from_score(0.9, 0.7, Some("velocity".into())));
        step(&mut payment, events);
        assert_eq!(payment.status(), PaymentStatus::Pending);
        assert!(payment.is_high_risk(0.7));
        assert!(!payment.is_high_risk(0.95));
        assert!(matches!(
            payment.set_fraud_score(FraudAssessment::from_score(1.5, 0.7, None)),
            Err(PaymentError::InvalidFraudScore(_))
        ));
    }
}
