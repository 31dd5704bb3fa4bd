//! Stock item aggregate implementation.

use chrono::Utc;
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::value_objects::{Money, ProductId};

use super::events::{
    ActivationData, LowStockData, ReorderLevelUpdatedData, StockItemRegisteredData,
    StockMovementData, UnitCostUpdatedData,
};
use super::{RegisterStockItem, StockError, StockEvent, StockLevel};

/// Sellable inventory for one product at one location.
///
/// Invariants after every event: `available + reserved <= max_stock_level`.
/// Reserve, release and confirm move units between the two buckets or out of
/// the item; only `add_stock` brings new units in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockItem {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    product_id: Option<ProductId>,
    product_name: String,
    sku: String,
    warehouse_location: String,
    available: u32,
    reserved: u32,
    reorder_level: u32,
    max_stock_level: u32,
    unit_cost: Money,
    active: bool,
}

impl Aggregate for StockItem {
    type Event = StockEvent;
    type Error = StockError;

    fn aggregate_type() -> &'static str {
        "StockItem"
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
            StockEvent::StockItemRegistered(data) => self.apply_registered(data),
            StockEvent::StockReserved(m)
            | StockEvent::StockReleased(m)
            | StockEvent::StockConfirmed(m)
            | StockEvent::StockAdded(m) => {
                self.available = m.available_after;
                self.reserved = m.reserved_after;
            }
            StockEvent::LowStockDetected(_) => {}
            StockEvent::ReorderLevelUpdated(data) => self.reorder_level = data.new_level,
            StockEvent::UnitCostUpdated(data) => self.unit_cost = data.new_cost,
            StockEvent::StockItemDeactivated(_) => self.active = false,
            StockEvent::StockItemActivated(_) => self.active = true,
        }
    }
}

impl StockItem {
    /// Stream id of the stock item for a product.
    pub fn stream_id(product_id: &ProductId) -> AggregateId {
        AggregateId::derived("stock-item", product_id.as_str())
    }
}

// Query methods
impl StockItem {
    pub fn product_id(&self) -> Option<&ProductId> {
        self.product_id.as_ref()
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn warehouse_location(&self) -> &str {
        &self.warehouse_location
    }

    pub fn available(&self) -> u32 {
        self.available
    }

    pub fn reserved(&self) -> u32 {
        self.reserved
    }

    pub fn reorder_level(&self) -> u32 {
        self.reorder_level
    }

    pub fn max_stock_level(&self) -> u32 {
        self.max_stock_level
    }

    pub fn unit_cost(&self) -> Money {
        self.unit_cost
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Units owned by the location: available plus reserved.
    pub fn total_quantity(&self) -> u32 {
        self.available + self.reserved
    }

    /// Returns true if a reservation of `quantity` would succeed.
    pub fn can_reserve(&self, quantity: u32) -> bool {
        self.active && quantity > 0 && self.available >= quantity
    }

    pub fn is_low_stock(&self) -> bool {
        self.available <= self.reorder_level
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.available == 0
    }

    pub fn stock_level(&self) -> StockLevel {
        StockLevel::classify(self.available, self.reorder_level)
    }
}

// Command methods (return events)
impl StockItem {
    /// Registers the item. Fails if it already exists or the levels are
    /// inconsistent.
    pub fn register(&self, cmd: RegisterStockItem) -> Result<Vec<StockEvent>, StockError> {
        if self.id.is_some() {
            return Err(StockError::AlreadyRegistered);
        }
        if cmd.max_stock_level == 0 {
            return Err(StockError::InvalidConfiguration(
                "max stock level must be greater than 0".into(),
            ));
        }
        if cmd.initial_quantity > cmd.max_stock_level {
            return Err(StockError::InvalidConfiguration(format!(
                "initial quantity {} exceeds max stock level {}",
                cmd.initial_quantity, cmd.max_stock_level
            )));
        }
        if cmd.reorder_level >= cmd.max_stock_level {
            return Err(StockError::InvalidConfiguration(format!(
                "reorder level {} must be below max stock level {}",
                cmd.reorder_level, cmd.max_stock_level
            )));
        }
        if cmd.unit_cost.is_negative() {
            return Err(StockError::InvalidUnitCost(cmd.unit_cost));
        }

        Ok(vec![StockEvent::StockItemRegistered(StockItemRegisteredData {
            item_id: StockItem::stream_id(&cmd.product_id),
            product_id: cmd.product_id,
            product_name: cmd.product_name,
            sku: cmd.sku,
            warehouse_location: cmd.warehouse_location,
            initial_quantity: cmd.initial_quantity,
            reorder_level: cmd.reorder_level,
            max_stock_level: cmd.max_stock_level,
            unit_cost: cmd.unit_cost,
            registered_at: Utc::now(),
        })])
    }

    /// Moves `quantity` from available to reserved.
    pub fn reserve(&self, quantity: u32) -> Result<Vec<StockEvent>, StockError> {
        self.ensure_registered()?;
        ensure_positive(quantity)?;
        if !self.active {
            return Err(StockError::Inactive);
        }
        if self.available < quantity {
            return Err(StockError::InsufficientStock {
                available: self.available,
                requested: quantity,
            });
        }

        let movement = StockMovementData {
            quantity,
            available_after: self.available - quantity,
            reserved_after: self.reserved + quantity,
        };
        Ok(self.with_low_stock_check(StockEvent::StockReserved(movement), movement))
    }

    /// Moves `quantity` from reserved back to available.
    pub fn release(&self, quantity: u32) -> Result<Vec<StockEvent>, StockError> {
        self.ensure_registered()?;
        ensure_positive(quantity)?;
        if self.reserved < quantity {
            return Err(StockError::InvalidRelease {
                reserved: self.reserved,
                requested: quantity,
            });
        }

        Ok(vec![StockEvent::StockReleased(StockMovementData {
            quantity,
            available_after: self.available + quantity,
            reserved_after: self.reserved - quantity,
        })])
    }

    /// Removes `quantity` of reserved stock as sold.
    pub fn confirm(&self, quantity: u32) -> Result<Vec<StockEvent>, StockError> {
        self.ensure_registered()?;
        ensure_positive(quantity)?;
        if self.reserved < quantity {
            return Err(StockError::InvalidConfirm {
                reserved: self.reserved,
                requested: quantity,
            });
        }

        Ok(vec![StockEvent::StockConfirmed(StockMovementData {
            quantity,
            available_after: self.available,
            reserved_after: self.reserved - quantity,
        })])
    }

    /// Receives `quantity` new units into available.
    pub fn add_stock(&self, quantity: u32) -> Result<Vec<StockEvent>, StockError> {
        self.ensure_registered()?;
        ensure_positive(quantity)?;
        let total_after = u64::from(self.total_quantity()) + u64::from(quantity);
        if total_after > u64::from(self.max_stock_level) {
            return Err(StockError::CapacityExceeded {
                current: self.total_quantity(),
                adding: quantity,
                max: self.max_stock_level,
            });
        }

        Ok(vec![StockEvent::StockAdded(StockMovementData {
            quantity,
            available_after: self.available + quantity,
            reserved_after: self.reserved,
        })])
    }

    /// Changes the reorder threshold. Raising it can put the item into low
    /// stock, which raises an alert like any other crossing.
    pub fn update_reorder_level(&self, new_level: u32) -> Result<Vec<StockEvent>, StockError> {
        self.ensure_registered()?;
        if new_level >= self.max_stock_level {
            return Err(StockError::InvalidConfiguration(format!(
                "reorder level {} must be below max stock level {}",
                new_level, self.max_stock_level
            )));
        }
        if new_level == self.reorder_level {
            return Ok(vec![]);
        }

        let mut events = vec![StockEvent::ReorderLevelUpdated(ReorderLevelUpdatedData {
            old_level: self.reorder_level,
            new_level,
        })];
        let after = StockLevel::classify(self.available, new_level);
        if let Some(level) = StockLevel::crossed_from(self.stock_level(), after) {
            events.push(StockEvent::LowStockDetected(LowStockData {
                level,
                available: self.available,
                reorder_level: new_level,
            }));
        }
        Ok(events)
    }

    pub fn update_unit_cost(&self, new_cost: Money) -> Result<Vec<StockEvent>, StockError> {
        self.ensure_registered()?;
        if new_cost.is_negative() {
            return Err(StockError::InvalidUnitCost(new_cost));
        }
        if new_cost == self.unit_cost {
            return Ok(vec![]);
        }
        Ok(vec![StockEvent::UnitCostUpdated(UnitCostUpdatedData {
            old_cost: self.unit_cost,
            new_cost,
        })])
    }

    /// Stops new reservations. Existing ones can still be released or
    /// confirmed.
    pub fn deactivate(&self) -> Result<Vec<StockEvent>, StockError> {
        self.ensure_registered()?;
        if !self.active {
            return Ok(vec![]);
        }
        Ok(vec![StockEvent::StockItemDeactivated(ActivationData {
            at: Utc::now(),
        })])
    }

    pub fn activate(&self) -> Result<Vec<StockEvent>, StockError> {
        self.ensure_registered()?;
        if self.active {
            return Ok(vec![]);
        }
        Ok(vec![StockEvent::StockItemActivated(ActivationData {
            at: Utc::now(),
        })])
    }

    fn ensure_registered(&self) -> Result<(), StockError> {
        if self.id.is_none() {
            return Err(StockError::NotRegistered);
        }
        Ok(())
    }

    fn with_low_stock_check(
        &self,
        event: StockEvent,
        movement: StockMovementData,
    ) -> Vec<StockEvent> {
        let after = StockLevel::classify(movement.available_after, self.reorder_level);
        match StockLevel::crossed_from(self.stock_level(), after) {
            Some(level) => vec![
                event,
                StockEvent::LowStockDetected(LowStockData {
                    level,
                    available: movement.available_after,
                    reorder_level: self.reorder_level,
                }),
            ],
            None => vec![event],
        }
    }
}

fn ensure_positive(quantity: u32) -> Result<(), StockError> {
    if quantity == 0 {
        return Err(StockError::InvalidQuantity { quantity });
    }
    Ok(())
}

// Apply event helpers
impl StockItem {
    fn apply_registered(&mut self, data: StockItemRegisteredData) {
        self.id = Some(data.item_id);
        self.product_id = Some(data.product_id);
        self.product_name = data.product_name;
        self.sku = data.sku;
        self.warehouse_location = data.warehouse_location;
        self.available = data.initial_quantity;
        self.reserved = 0;
        self.reorder_level = data.reorder_level;
        self.max_stock_level = data.max_stock_level;
        self.unit_cost = data.unit_cost;
        self.active = true;
    }
}
