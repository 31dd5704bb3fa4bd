//! Payment service for intent management, cancellation and refunds.
//!
//! Sending a payment through fraud check and gateway is orchestrated by the
//! coordination layer, which needs capabilities this crate does not own.

use chrono::Utc;
use event_store::EventStore;

use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;
use crate::retry::{RetryPolicy, retry_on_conflict};
use crate::value_objects::Money;

use super::{InitiatePayment, Payment, PaymentIntentId};

/// Service for managing payments.
pub struct PaymentService<S: EventStore> {
    handler: CommandHandler<S, Payment>,
    retry: RetryPolicy,
}

impl<S: EventStore> PaymentService<S> {
    pub fn new(store: S) -> Self {
        Self::with_retry(store, RetryPolicy::default())
    }

    pub fn with_retry(store: S, retry: RetryPolicy) -> Self {
        Self {
            handler: CommandHandler::new(store),
            retry,
        }
    }

    pub fn handler(&self) -> &CommandHandler<S, Payment> {
        &self.handler
    }

    /// Opens a payment intent in PENDING.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, amount = %cmd.amount))]
    pub async fn create_intent(
        &self,
        cmd: InitiatePayment,
    ) -> Result<CommandResult<Payment>, DomainError> {
        let intent_id = cmd
            .payment_intent_id
            .clone()
            .unwrap_or_else(PaymentIntentId::generate);
        let id = intent_id.stream_id();

        let result = self
            .handler
            .execute(id, |payment| payment.initiate(intent_id.clone(), &cmd, Utc::now()))
            .await?;
        tracing::info!(payment_intent_id = %intent_id, "payment intent created");
        Ok(result)
    }

    /// Returns the payment for an intent, if it exists.
    pub async fn get(&self, intent_id: &PaymentIntentId) -> Result<Option<Payment>, DomainError> {
        self.handler.load_existing(intent_id.stream_id()).await
    }

    #[tracing::instrument(skip(self), fields(payment_intent_id = %intent_id))]
    pub async fn cancel(
        &self,
        intent_id: &PaymentIntentId,
        reason: Option<String>,
    ) -> Result<CommandResult<Payment>, DomainError> {
        let id = intent_id.stream_id();
        retry_on_conflict(&self.retry, || {
            let reason = reason.clone();
            self.handler
                .execute_existing(id, move |payment| payment.mark_cancelled(reason, Utc::now()))
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(payment_intent_id = %intent_id, amount = %amount))]
    pub async fn refund(
        &self,
        intent_id: &PaymentIntentId,
        amount: Money,
    ) -> Result<CommandResult<Payment>, DomainError> {
        let id = intent_id.stream_id();
        let result = retry_on_conflict(&self.retry, || {
            self.handler
                .execute_existing(id, move |payment| payment.process_refund(amount, Utc::now()))
        })
        .await?;
        tracing::info!(
            status = %result.aggregate.status(),
            refunded = %result.aggregate.refunded_amount(),
            "refund processed"
        );
        Ok(result)
    }
}
