//! Payment processing: fraud check, then gateway, then one final commit.

use std::time::{Duration, Instant};

use chrono::Utc;
use domain::contracts::{FraudDetected, PaymentProcessed};
use domain::{
    Aggregate, CommandHandler, DomainError, FraudAssessment, Payment, PaymentError,
    PaymentIntentId, PaymentStatus, RetryPolicy, UnitOfWork, retry_on_conflict,
};
use event_store::EventStore;

use crate::services::{ChargeOutcome, FraudCheck, GatewayError, PaymentGateway};
use crate::{Result, SagaError};

/// Request context for processing a payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessPaymentRequest {
    pub payment_intent_id: PaymentIntentId,
    pub payment_method_id: String,
    pub cvv: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ProcessPaymentRequest {
    pub fn new(payment_intent_id: PaymentIntentId, payment_method_id: impl Into<String>) -> Self {
        Self {
            payment_intent_id,
            payment_method_id: payment_method_id.into(),
            cvv: None,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn with_cvv(mut self, cvv: impl Into<String>) -> Self {
        self.cvv = Some(cvv.into());
        self
    }

    pub fn with_client(
        mut self,
        ip_address: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        self.ip_address = Some(ip_address.into());
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Sends payment intents through fraud check and gateway.
pub struct PaymentOrchestrator<S: EventStore, F: FraudCheck, G: PaymentGateway> {
    store: S,
    payments: CommandHandler<S, Payment>,
    fraud: F,
    gateway: G,
    gateway_timeout: Duration,
    retry: RetryPolicy,
}

impl<S, F, G> PaymentOrchestrator<S, F, G>
where
    S: EventStore + Clone,
    F: FraudCheck,
    G: PaymentGateway,
{
    pub fn new(store: S, fraud: F, gateway: G) -> Self {
        Self {
            payments: CommandHandler::new(store.clone()),
            store,
            fraud,
            gateway,
            gateway_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Processes a PENDING payment intent.
    ///
    /// A high-risk fraud assessment is recorded, `FraudDetected` is emitted
    /// and the payment stays PENDING. Otherwise the payment moves to
    /// PROCESSING before the gateway is called, and ends COMPLETED or FAILED
    /// in a single commit that also emits `PaymentProcessed`.
    #[tracing::instrument(skip(self, request), fields(payment_intent_id = %request.payment_intent_id))]
    pub async fn process(&self, request: &ProcessPaymentRequest) -> Result<Payment> {
        let id = request.payment_intent_id.stream_id();
        let payment = self
            .payments
            .load_existing(id)
            .await?
            .ok_or_else(|| SagaError::PaymentNotFound(request.payment_intent_id.clone()))?;
        if !payment.is_processable() {
            return Err(DomainError::from(PaymentError::IllegalPaymentState {
                current: payment.status(),
                attempted: PaymentStatus::Processing,
            })
            .into());
        }

        let assessment = self.fraud.check(&payment, request).await.map_err(|e| {
            tracing::warn!(error = %e, "fraud check failed, payment left pending");
            SagaError::from(e)
        })?;

        if assessment.is_high_risk {
            return Err(self.block(&payment, assessment).await?);
        }

        let processing = self.start_processing(&payment, assessment).await?;
        let outcome = self.charge(&processing, request).await;
        let completed = self.finish(request, outcome).await?;

        let status = completed.status();
        metrics::counter!("payments_processed_total", "status" => status.as_str()).increment(1);
        tracing::info!(
            status = %status,
            transaction_id = ?completed.gateway_transaction_id(),
            "payment processed"
        );
        Ok(completed)
    }

    /// Records a high-risk score with `FraudDetected` and returns the error
    /// the caller should see. A concurrent write to the payment makes the
    /// commit retry from a fresh load.
    async fn block(&self, payment: &Payment, assessment: FraudAssessment) -> Result<SagaError> {
        let id = payment_stream(payment)?;
        let reason = assessment
            .reason
            .clone()
            .unwrap_or_else(|| "high risk score".to_string());
        let score = assessment.score;
        let (assessment, reason_ref) = (&assessment, &reason);

        retry_on_conflict(&self.retry, move || async move {
            let payment = self.payments.require(id).await?;
            if !payment.is_processable() {
                return Err(SagaError::from(DomainError::from(
                    PaymentError::IllegalPaymentState {
                        current: payment.status(),
                        attempted: PaymentStatus::Processing,
                    },
                )));
            }
            let events = payment
                .set_fraud_score(assessment.clone())
                .map_err(DomainError::from)?;
            let detected = FraudDetected {
                payment_intent_id: payment
                    .intent_id()
                    .cloned()
                    .ok_or(DomainError::from(PaymentError::NotInitiated))?,
                order_id: payment
                    .order_id()
                    .ok_or(DomainError::from(PaymentError::NotInitiated))?,
                customer_id: payment
                    .customer_id()
                    .ok_or(DomainError::from(PaymentError::NotInitiated))?,
                amount: payment.amount(),
                fraud_score: score,
                reason: reason_ref.clone(),
                ip_address: payment.ip_address().map(str::to_string),
            };

            let mut unit = UnitOfWork::new();
            unit.record(id, &payment, &events)?;
            unit.publish(&detected)?;
            unit.commit(&self.store).await?;
            Ok::<_, SagaError>(())
        })
        .await?;

        metrics::counter!("payments_fraud_blocked_total").increment(1);
        tracing::warn!(score, %reason, "payment blocked by fraud check");
        Ok(SagaError::FraudBlocked { reason, score })
    }

    /// Records the assessment and moves PENDING to PROCESSING in one commit.
    /// A concurrent processor loses the commit and finds the payment no
    /// longer processable.
    async fn start_processing(
        &self,
        payment: &Payment,
        assessment: FraudAssessment,
    ) -> Result<Payment> {
        let id = payment_stream(payment)?;
        let now = Utc::now();

        let mut events = payment
            .set_fraud_score(assessment)
            .map_err(DomainError::from)?;
        let scored = payment.with_events(&events);
        events.extend(scored.mark_processing(now).map_err(DomainError::from)?);

        let mut unit = UnitOfWork::new();
        unit.record(id, payment, &events)?;
        unit.commit(&self.store).await?;
        Ok(payment.with_events(&events))
    }

    async fn charge(
        &self,
        payment: &Payment,
        request: &ProcessPaymentRequest,
    ) -> std::result::Result<ChargeOutcome, GatewayError> {
        let started = Instant::now();
        let result = match tokio::time::timeout(
            self.gateway_timeout,
            self.gateway.charge(payment, request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.gateway_timeout)),
        };
        metrics::histogram!("payment_gateway_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::warn!(error = %e, "payment gateway call failed");
        }
        result
    }

    /// Applies the gateway outcome to the PROCESSING payment and emits
    /// `PaymentProcessed`, retrying on conflict from a fresh load.
    async fn finish(
        &self,
        request: &ProcessPaymentRequest,
        outcome: std::result::Result<ChargeOutcome, GatewayError>,
    ) -> Result<Payment> {
        let id = request.payment_intent_id.stream_id();
        let outcome = &outcome;
        retry_on_conflict(&self.retry, move || async move {
            let payment = self.payments.require(id).await?;
            let now = Utc::now();
            let events = match outcome {
                Ok(ChargeOutcome::Approved {
                    transaction_id,
                    gateway_response,
                }) => payment.mark_completed(transaction_id.clone(), gateway_response.clone(), now),
                Ok(ChargeOutcome::Declined {
                    reason,
                    gateway_response,
                }) => payment.mark_failed(reason.clone(), gateway_response.clone(), now),
                Err(e) => payment.mark_failed(format!("Gateway error: {e}"), None, now),
            }
            .map_err(DomainError::from)?;

            let finished = payment.with_events(&events);
            let processed = PaymentProcessed::from_payment(&finished)
                .ok_or(DomainError::from(PaymentError::NotInitiated))?;

            let mut unit = UnitOfWork::new();
            unit.record(id, &payment, &events)?;
            unit.publish(&processed)?;
            unit.commit(&self.store).await?;
            Ok::<_, SagaError>(finished)
        })
        .await
    }
}

fn payment_stream(payment: &Payment) -> Result<common::AggregateId> {
    payment
        .intent_id()
        .map(PaymentIntentId::stream_id)
        .ok_or_else(|| DomainError::from(PaymentError::NotInitiated).into())
}
