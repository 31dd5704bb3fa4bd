//! Stock item domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::value_objects::{Money, ProductId};

use super::StockLevel;

/// Events that can occur on a stock item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StockEvent {
    StockItemRegistered(StockItemRegisteredData),

    /// Quantity moved from available to reserved.
    StockReserved(StockMovementData),

    /// Quantity moved from reserved back to available.
    StockReleased(StockMovementData),

    /// Reserved quantity left the building.
    StockConfirmed(StockMovementData),

    /// New units received into available.
    StockAdded(StockMovementData),

    /// The item crossed into a worse stock level.
    LowStockDetected(LowStockData),

    ReorderLevelUpdated(ReorderLevelUpdatedData),

    UnitCostUpdated(UnitCostUpdatedData),

    StockItemDeactivated(ActivationData),

    StockItemActivated(ActivationData),
}

impl DomainEvent for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::StockItemRegistered(_) => "StockItemRegistered",
            StockEvent::StockReserved(_) => "StockReserved",
            StockEvent::StockReleased(_) => "StockReleased",
            StockEvent::StockConfirmed(_) => "StockConfirmed",
            StockEvent::StockAdded(_) => "StockAdded",
            StockEvent::LowStockDetected(_) => "LowStockDetected",
            StockEvent::ReorderLevelUpdated(_) => "ReorderLevelUpdated",
            StockEvent::UnitCostUpdated(_) => "UnitCostUpdated",
            StockEvent::StockItemDeactivated(_) => "StockItemDeactivated",
            StockEvent::StockItemActivated(_) => "StockItemActivated",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockItemRegisteredData {
    pub item_id: AggregateId,
    pub product_id: ProductId,
    pub product_name: String,
    pub sku: String,
    pub warehouse_location: String,
    pub initial_quantity: u32,
    pub reorder_level: u32,
    pub max_stock_level: u32,
    pub unit_cost: Money,
    pub registered_at: DateTime<Utc>,
}

/// Quantity moved plus the resulting balances.
///
/// Replay sets the balances from the `_after` fields so a stream folds to
/// the same state no matter how it is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovementData {
    pub quantity: u32,
    pub available_after: u32,
    pub reserved_after: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LowStockData {
    pub level: StockLevel,
    pub available: u32,
    pub reorder_level: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReorderLevelUpdatedData {
    pub old_level: u32,
    pub new_level: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UnitCostUpdatedData {
    pub old_cost: Money,
    pub new_cost: Money,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActivationData {
    pub at: DateTime<Utc>,
}

impl StockEvent {
    /// Returns the low-stock data if this is a `LowStockDetected` event.
    pub fn as_low_stock(&self) -> Option<&LowStockData> {
        match self {
            StockEvent::LowStockDetected(data) => Some(data),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = StockEvent::StockReserved(StockMovementData {
            quantity: 2,
            available_after: 8,
            reserved_after: 2,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "StockReserved");
        assert_eq!(json["data"]["available_after"], 8);

        let back: StockEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.event_type(), "StockReserved");
    }
}
