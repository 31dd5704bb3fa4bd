//! Integration events exchanged with other services.
//!
//! Field names are camelCase on the wire. Outbound events are written to
//! the outbox in the same commit as the state change they describe.

use event_store::OutboxMessage;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::inventory::{StockEvent, StockItem};
use crate::payment::{Payment, PaymentIntentId, PaymentStatus};
use crate::value_objects::{CustomerId, Money, OrderId, OrderLine, ProductId};

/// Bus topics.
pub mod topics {
    pub const INVENTORY_RESERVED: &str = "inventory.reserved";
    pub const INVENTORY_RESERVATION_FAILED: &str = "inventory.reservation-failed";
    pub const INVENTORY_LOW_STOCK: &str = "inventory.low-stock";
    pub const PAYMENT_PROCESSED: &str = "payment.processed";
    pub const PAYMENT_FRAUD_DETECTED: &str = "payment.fraud-detected";
    pub const ORDER_PLACED: &str = "order.placed";
    pub const ORDER_CANCELLED: &str = "order.cancelled";
}

/// An event with a fixed topic and a partition key.
pub trait IntegrationEvent: Serialize + DeserializeOwned {
    const TOPIC: &'static str;

    /// The id of the entity the event is about.
    fn key(&self) -> String;

    fn to_outbox(&self) -> Result<OutboxMessage, serde_json::Error> {
        Ok(OutboxMessage::new(
            Self::TOPIC,
            self.key(),
            serde_json::to_value(self)?,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReserved {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub reservation_id: String,
}

impl IntegrationEvent for InventoryReserved {
    const TOPIC: &'static str = topics::INVENTORY_RESERVED;

    fn key(&self) -> String {
        self.order_id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReservationFailed {
    pub order_id: OrderId,
    pub unavailable_products: Vec<ProductId>,
    pub reason: String,
}

impl IntegrationEvent for InventoryReservationFailed {
    const TOPIC: &'static str = topics::INVENTORY_RESERVATION_FAILED;

    fn key(&self) -> String {
        self.order_id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LowStockAlert {
    pub product_id: ProductId,
    pub product_name: String,
    pub sku: String,
    pub current_quantity: u32,
    pub reorder_level: u32,
    pub warehouse_location: String,
}

impl LowStockAlert {
    /// Builds the alert for `item` (state after `events`) if the events
    /// contain a low-stock crossing.
    pub fn from_stock_events(item: &StockItem, events: &[StockEvent]) -> Option<Self> {
        let low = events.iter().find_map(StockEvent::as_low_stock)?;
        let product_id = item.product_id()?.clone();
        Some(Self {
            product_id,
            product_name: item.product_name().to_string(),
            sku: item.sku().to_string(),
            current_quantity: low.available,
            reorder_level: low.reorder_level,
            warehouse_location: item.warehouse_location().to_string(),
        })
    }
}

impl IntegrationEvent for LowStockAlert {
    const TOPIC: &'static str = topics::INVENTORY_LOW_STOCK;

    fn key(&self) -> String {
        self.product_id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProcessed {
    pub payment_intent_id: PaymentIntentId,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub amount: Money,
    pub status: PaymentStatus,
    pub gateway_transaction_id: Option<String>,
}

impl PaymentProcessed {
    /// Describes the final state of `payment`. None if it was never
    /// initiated.
    pub fn from_payment(payment: &Payment) -> Option<Self> {
        Some(Self {
            payment_intent_id: payment.intent_id()?.clone(),
            order_id: payment.order_id()?,
            customer_id: payment.customer_id()?,
            amount: payment.amount(),
            status: payment.status(),
            gateway_transaction_id: payment.gateway_transaction_id().map(str::to_string),
        })
    }
}

impl IntegrationEvent for PaymentProcessed {
    const TOPIC: &'static str = topics::PAYMENT_PROCESSED;

    fn key(&self) -> String {
        self.payment_intent_id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudDetected {
    pub payment_intent_id: PaymentIntentId,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub amount: Money,
    pub fraud_score: f64,
    pub reason: String,
    pub ip_address: Option<String>,
}

impl IntegrationEvent for FraudDetected {
    const TOPIC: &'static str = topics::PAYMENT_FRAUD_DETECTED;

    fn key(&self) -> String {
        self.payment_intent_id.to_string()
    }
}

/// Inbound: an order was placed and needs stock held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub lines: Vec<OrderLine>,
}

impl IntegrationEvent for OrderPlaced {
    const TOPIC: &'static str = topics::ORDER_PLACED;

    fn key(&self) -> String {
        self.order_id.to_string()
    }
}

/// Inbound: an order was cancelled and its holds can go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelled {
    pub order_id: OrderId,
    #[serde(default)]
    pub reason: Option<String>,
}

impl IntegrationEvent for OrderCancelled {
    const TOPIC: &'static str = topics::ORDER_CANCELLED;

    fn key(&self) -> String {
        self.order_id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregate;
    use crate::inventory::RegisterStockItem;

    #[test]
    fn inventory_reserved_wire_format() {
        let order_id = OrderId::new();
        let event = InventoryReserved {
            order_id,
            product_id: ProductId::new("P1"),
            quantity: 2,
            reservation_id: "r-1".into(),
        };
        let message = event.to_outbox().unwrap();

        assert_eq!(message.topic, "inventory.reserved");
        assert_eq!(message.key, order_id.to_string());
        assert_eq!(message.payload["productId"], "P1");
        assert_eq!(message.payload["reservationId"], "r-1");
        assert_eq!(message.payload["quantity"], 2);
    }

    #[test]
    fn low_stock_alert_comes_from_crossing_events_only() {
        let mut item = StockItem::default();
        item.apply_events(
            item.register(
                RegisterStockItem::new("P1", "Widget", 10, 3, 10)
                    .with_sku("SKU-1")
                    .at_location("WH-EAST"),
            )
            .unwrap(),
        );

        let quiet = item.reserve(1).unwrap();
        assert!(LowStockAlert::from_stock_events(&item.with_events(&quiet), &quiet).is_none());

        let crossing = item.reserve(8).unwrap();
        let after = item.with_events(&crossing);
        let alert = LowStockAlert::from_stock_events(&after, &crossing).unwrap();
        assert_eq!(alert.current_quantity, 2);
        assert_eq!(alert.reorder_level, 3);
        assert_eq!(alert.sku, "SKU-1");
        assert_eq!(alert.warehouse_location, "WH-EAST");
        assert_eq!(alert.to_outbox().unwrap().key, "P1");
    }

    #[test]
    fn order_placed_parses_camel_case() {
        let order_id = OrderId::new();
        let customer_id = CustomerId::new();
        let json = serde_json::json!({
            "orderId": order_id,
            "customerId": customer_id,
            "lines": [{ "productId": "P1", "quantity": 3 }]
        });
        let parsed: OrderPlaced = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.order_id, order_id);
        assert_eq!(parsed.lines, vec![OrderLine::new("P1", 3)]);
    }

    #[test]
    fn order_cancelled_reason_is_optional() {
        let parsed: OrderCancelled =
            serde_json::from_value(serde_json::json!({ "orderId": OrderId::new() })).unwrap();
        assert!(parsed.reason.is_none());
    }
}
