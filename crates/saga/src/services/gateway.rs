//! Payment gateway capability and an in-memory gateway.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{Payment, PaymentIntentId};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::payments::ProcessPaymentRequest;

/// What the gateway decided about a charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Approved {
        transaction_id: String,
        gateway_response: String,
    },
    Declined {
        reason: String,
        gateway_response: Option<String>,
    },
}

/// The gateway could not be reached or answered garbage.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Charges a payment. Implementations must treat the payment intent id as
/// an idempotency key.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(
        &self,
        payment: &Payment,
        request: &ProcessPaymentRequest,
    ) -> Result<ChargeOutcome, GatewayError>;
}

#[async_trait]
impl<G: PaymentGateway + ?Sized> PaymentGateway for Arc<G> {
    async fn charge(
        &self,
        payment: &Payment,
        request: &ProcessPaymentRequest,
    ) -> Result<ChargeOutcome, GatewayError> {
        (**self).charge(payment, request).await
    }
}

#[derive(Debug, Clone, Default)]
enum GatewayBehavior {
    #[default]
    Approve,
    Decline(String),
    Fail(String),
}

#[derive(Debug, Default)]
struct GatewayState {
    behavior: GatewayBehavior,
    delay: Option<Duration>,
    charges: HashMap<PaymentIntentId, ChargeOutcome>,
    calls: usize,
    next_transaction: u32,
}

/// Scriptable gateway. Remembers each intent's outcome and replays it for
/// repeated charges of the same intent.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<GatewayState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn approve_all(&self) {
        self.state.write().await.behavior = GatewayBehavior::Approve;
    }

    pub async fn decline_all(&self, reason: &str) {
        self.state.write().await.behavior = GatewayBehavior::Decline(reason.to_string());
    }

    /// Every call fails with a transport error.
    pub async fn fail_all(&self, message: &str) {
        self.state.write().await.behavior = GatewayBehavior::Fail(message.to_string());
    }

    /// Sleeps before answering.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().await.delay = delay;
    }

    /// Number of charge calls received, repeats included.
    pub async fn call_count(&self) -> usize {
        self.state.read().await.calls
    }

    /// Number of distinct intents with a recorded outcome.
    pub async fn charge_count(&self) -> usize {
        self.state.read().await.charges.len()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn charge(
        &self,
        _payment: &Payment,
        request: &ProcessPaymentRequest,
    ) -> Result<ChargeOutcome, GatewayError> {
        let delay = {
            let mut state = self.state.write().await;
            state.calls += 1;
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;
        if let Some(previous) = state.charges.get(&request.payment_intent_id) {
            return Ok(previous.clone());
        }

        let outcome = match state.behavior.clone() {
            GatewayBehavior::Fail(message) => return Err(GatewayError::Transport(message)),
            GatewayBehavior::Approve => {
                state.next_transaction += 1;
                ChargeOutcome::Approved {
                    transaction_id: format!("txn_{:06}", state.next_transaction),
                    gateway_response: "approved".to_string(),
                }
            }
            GatewayBehavior::Decline(reason) => ChargeOutcome::Declined {
                gateway_response: Some(format!("declined: {reason}")),
                reason,
            },
        };
        state
            .charges
            .insert(request.payment_intent_id.clone(), outcome.clone());
        Ok(outcome)
    }
}
