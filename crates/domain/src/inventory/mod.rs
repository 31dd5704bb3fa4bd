//! Stock ledger: the StockItem aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod level;
mod service;

pub use aggregate::StockItem;
pub use commands::RegisterStockItem;
pub use events::{
    ActivationData, LowStockData, ReorderLevelUpdatedData, StockEvent, StockItemRegisteredData,
    StockMovementData, UnitCostUpdatedData,
};
pub use level::StockLevel;
pub use service::{InventoryService, low_stock_outbox, note_low_stock};

use thiserror::Error;

use crate::error::ErrorKind;
use crate::value_objects::Money;

/// Errors that can occur during stock operations.
#[derive(Debug, Error)]
pub enum StockError {
    #[error("Insufficient stock: {available} available, {requested} requested")]
    InsufficientStock { available: u32, requested: u32 },

    #[error("Cannot release {requested}: only {reserved} reserved")]
    InvalidRelease { reserved: u32, requested: u32 },

    #[error("Cannot confirm {requested}: only {reserved} reserved")]
    InvalidConfirm { reserved: u32, requested: u32 },

    #[error("Capacity exceeded: {current} on hand + {adding} exceeds max {max}")]
    CapacityExceeded { current: u32, adding: u32, max: u32 },

    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    #[error("Stock item is inactive")]
    Inactive,

    #[error("Stock item already registered")]
    AlreadyRegistered,

    #[error("Stock item not registered")]
    NotRegistered,

    #[error("Invalid stock configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid unit cost: {0}")]
    InvalidUnitCost(Money),
}

impl StockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StockError::InvalidQuantity { .. }
            | StockError::InvalidConfiguration(_)
            | StockError::InvalidUnitCost(_) => ErrorKind::Validation,
            StockError::NotRegistered => ErrorKind::NotFound,
            StockError::InsufficientStock { .. }
            | StockError::InvalidRelease { .. }
            | StockError::InvalidConfirm { .. }
            | StockError::CapacityExceeded { .. }
            | StockError::Inactive
            | StockError::AlreadyRegistered => ErrorKind::BusinessRule,
        }
    }
}
