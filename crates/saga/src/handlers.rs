//! Choreography: reacting to order and payment events delivered by the bus.
//!
//! Every handler is safe to run more than once for the same message.
//! Reservation ids derive from the order line, releasing a terminal
//! reservation writes nothing, and confirmed reservations are skipped.

use std::sync::Arc;

use domain::contracts::{OrderCancelled, OrderPlaced, PaymentProcessed, topics};
use domain::{OrderId, PaymentStatus, ProductId};
use event_store::EventStore;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::reservations::{OrderOutcome, OrderReservation, ReservationCoordinator};
use crate::{Result, SagaError};

/// What a handled message led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    Reserved(OrderReservation),
    /// Stock could not be held; `inventory.reservation-failed` was emitted.
    Refused {
        order_id: OrderId,
        unavailable_products: Vec<ProductId>,
    },
    Confirmed(OrderOutcome),
    Released(OrderOutcome),
    /// Topic or status this service does not act on.
    Ignored,
}

/// Consumes `order.placed`, `order.cancelled` and `payment.processed`.
pub struct InventoryEventHandler<S: EventStore + Clone> {
    coordinator: Arc<ReservationCoordinator<S>>,
}

impl<S: EventStore + Clone> Clone for InventoryEventHandler<S> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}

impl<S: EventStore + Clone> InventoryEventHandler<S> {
    pub fn new(coordinator: Arc<ReservationCoordinator<S>>) -> Self {
        Self { coordinator }
    }

    #[tracing::instrument(skip(self, payload))]
    pub async fn handle(&self, topic: &str, payload: &Value) -> Result<Handled> {
        match topic {
            topics::ORDER_PLACED => self.on_order_placed(parse(payload)?).await,
            topics::ORDER_CANCELLED => self.on_order_cancelled(parse(payload)?).await,
            topics::PAYMENT_PROCESSED => self.on_payment_processed(parse(payload)?).await,
            _ => {
                tracing::debug!("ignoring message");
                Ok(Handled::Ignored)
            }
        }
    }

    async fn on_order_placed(&self, event: OrderPlaced) -> Result<Handled> {
        let ttl = self.coordinator.default_ttl();
        match self
            .coordinator
            .reserve_order(event.order_id, &event.lines, ttl)
            .await
        {
            Ok(reservation) => Ok(Handled::Reserved(reservation)),
            Err(SagaError::ReservationFailed {
                order_id,
                unavailable_products,
                ..
            }) => Ok(Handled::Refused {
                order_id,
                unavailable_products,
            }),
            Err(e) => Err(e),
        }
    }

    async fn on_order_cancelled(&self, event: OrderCancelled) -> Result<Handled> {
        let reason = event.reason.as_deref().unwrap_or("order cancelled");
        let outcome = self.coordinator.release_order(event.order_id, reason).await?;
        Ok(Handled::Released(outcome))
    }

    async fn on_payment_processed(&self, event: PaymentProcessed) -> Result<Handled> {
        match event.status {
            PaymentStatus::Completed => {
                let outcome = self.coordinator.confirm_order(event.order_id).await?;
                Ok(Handled::Confirmed(outcome))
            }
            PaymentStatus::Failed => {
                let outcome = self
                    .coordinator
                    .release_order(event.order_id, "payment failed")
                    .await?;
                Ok(Handled::Released(outcome))
            }
            other => {
                tracing::debug!(status = other.as_str(), "no stock action for payment status");
                Ok(Handled::Ignored)
            }
        }
    }
}

fn parse<T: DeserializeOwned>(payload: &Value) -> Result<T> {
    Ok(T::deserialize(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_side::ReadModels;
    use chrono::Duration;
    use domain::{CustomerId, InventoryService, Money, PaymentIntentId, RegisterStockItem};
    use event_store::InMemoryEventStore;
    use serde_json::json;

    async fn setup() -> (
        InventoryService<InMemoryEventStore>,
        InventoryEventHandler<InMemoryEventStore>,
    ) {
        let store = InMemoryEventStore::new();
        let inventory = InventoryService::new(store.clone());
        inventory
            .register(RegisterStockItem::new("A", "Alpha", 10, 0, 100))
            .await
            .unwrap();
        let coordinator = ReservationCoordinator::new(store.clone(), ReadModels::new(store))
            .with_default_ttl(Duration::minutes(5));
        (inventory, InventoryEventHandler::new(Arc::new(coordinator)))
    }

    fn order_placed(order_id: OrderId, quantity: u32) -> Value {
        json!({
            "orderId": order_id,
            "customerId": CustomerId::new(),
            "lines": [{ "productId": "A", "quantity": quantity }]
        })
    }

    fn payment_processed(order_id: OrderId, status: &str) -> Value {
        json!({
            "paymentIntentId": PaymentIntentId::generate(),
            "orderId": order_id,
            "customerId": CustomerId::new(),
            "amount": Money::from_dollars(10),
            "status": status,
            "gatewayTransactionId": null
        })
    }

    async fn balances(inventory: &InventoryService<InMemoryEventStore>) -> (u32, u32) {
        let item = inventory.get(&ProductId::new("A")).await.unwrap().unwrap();
        (item.available(), item.reserved())
    }

    #[tokio::test]
    async fn redelivered_order_placed_reserves_once() {
        let (inventory, handler) = setup().await;
        let order_id = OrderId::new();
        let message = order_placed(order_id, 4);

        let first = handler.handle("order.placed", &message).await.unwrap();
        assert!(matches!(first, Handled::Reserved(ref r) if r.lines[0].newly_created));
        let second = handler.handle("order.placed", &message).await.unwrap();
        assert!(matches!(second, Handled::Reserved(ref r) if !r.lines[0].newly_created));

        assert_eq!(balances(&inventory).await, (6, 4));
    }

    #[tokio::test]
    async fn unavailable_stock_is_an_outcome_not_an_error() {
        let (inventory, handler) = setup().await;
        let order_id = OrderId::new();

        let handled = handler
            .handle("order.placed", &order_placed(order_id, 11))
            .await
            .unwrap();
        assert_eq!(
            handled,
            Handled::Refused {
                order_id,
                unavailable_products: vec![ProductId::new("A")],
            }
        );
        assert_eq!(balances(&inventory).await, (10, 0));
    }

    #[tokio::test]
    async fn payment_outcome_confirms_or_releases() {
        let (inventory, handler) = setup().await;
        let paid = OrderId::new();
        let declined = OrderId::new();
        handler.handle("order.placed", &order_placed(paid, 3)).await.unwrap();
        handler
            .handle("order.placed", &order_placed(declined, 2))
            .await
            .unwrap();
        assert_eq!(balances(&inventory).await, (5, 5));

        let confirmed = handler
            .handle("payment.processed", &payment_processed(paid, "COMPLETED"))
            .await
            .unwrap();
        assert!(matches!(confirmed, Handled::Confirmed(ref o) if o.applied == 1));
        let released = handler
            .handle("payment.processed", &payment_processed(declined, "FAILED"))
            .await
            .unwrap();
        assert!(matches!(released, Handled::Released(ref o) if o.applied == 1));

        assert_eq!(balances(&inventory).await, (7, 0));
    }

    #[tokio::test]
    async fn cancellation_releases_and_repeats_quietly() {
        let (inventory, handler) = setup().await;
        let order_id = OrderId::new();
        handler
            .handle("order.placed", &order_placed(order_id, 3))
            .await
            .unwrap();

        let cancel = json!({ "orderId": order_id });
        handler.handle("order.cancelled", &cancel).await.unwrap();
        let again = handler.handle("order.cancelled", &cancel).await.unwrap();
        assert!(matches!(again, Handled::Released(ref o) if o.applied == 0 && o.unchanged == 1));
        assert_eq!(balances(&inventory).await, (10, 0));
    }

    #[tokio::test]
    async fn order_placed_after_cancellation_is_refused() {
        let (inventory, handler) = setup().await;
        let order_id = OrderId::new();
        let placed = order_placed(order_id, 3);
        handler.handle("order.placed", &placed).await.unwrap();
        handler
            .handle("order.cancelled", &json!({ "orderId": order_id }))
            .await
            .unwrap();

        let redelivered = handler.handle("order.placed", &placed).await.unwrap();
        assert_eq!(
            redelivered,
            Handled::Refused {
                order_id,
                unavailable_products: vec![ProductId::new("A")],
            }
        );
        assert_eq!(balances(&inventory).await, (10, 0));
    }

    #[tokio::test]
    async fn unknown_topics_and_bad_payloads() {
        let (_, handler) = setup().await;
        assert_eq!(
            handler.handle("shipment.created", &json!({})).await.unwrap(),
            Handled::Ignored
        );
        let err = handler
            .handle("order.placed", &json!({ "orderId": 42 }))
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::Serialization(_)));
    }
}
