//! Stock item commands.

use crate::value_objects::{Money, ProductId};

/// Command to register a product at a warehouse location.
#[derive(Debug, Clone)]
pub struct RegisterStockItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub sku: String,
    pub warehouse_location: String,
    pub initial_quantity: u32,
    pub reorder_level: u32,
    pub max_stock_level: u32,
    pub unit_cost: Money,
}

impl RegisterStockItem {
    /// Creates a registration with the product id doubling as SKU and
    /// default location.
    pub fn new(
        product_id: impl Into<ProductId>,
        product_name: impl Into<String>,
        initial_quantity: u32,
        reorder_level: u32,
        max_stock_level: u32,
    ) -> Self {
        let product_id = product_id.into();
        Self {
            sku: product_id.to_string(),
            product_id,
            product_name: product_name.into(),
            warehouse_location: "MAIN".to_string(),
            initial_quantity,
            reorder_level,
            max_stock_level,
            unit_cost: Money::zero(),
        }
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = sku.into();
        self
    }

    pub fn at_location(mut self, location: impl Into<String>) -> Self {
        self.warehouse_location = location.into();
        self
    }

    pub fn with_unit_cost(mut self, unit_cost: Money) -> Self {
        self.unit_cost = unit_cost;
        self
    }
}
