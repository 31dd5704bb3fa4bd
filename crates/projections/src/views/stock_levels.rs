//! Stock levels read model: current balances and low-stock listing per item.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use domain::{Aggregate, ProductId, StockEvent, StockItem, StockLevel};
use event_store::EventEnvelope;
use tokio::sync::RwLock;

use crate::projection::{Projection, ProjectionPosition};
use crate::{ProjectionError, Result};

/// Current balances of one stock item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockSummary {
    pub product_id: ProductId,
    pub product_name: String,
    pub sku: String,
    pub warehouse_location: String,
    pub available: u32,
    pub reserved: u32,
    pub reorder_level: u32,
    pub max_stock_level: u32,
    pub active: bool,
}

impl StockSummary {
    pub fn level(&self) -> StockLevel {
        StockLevel::classify(self.available, self.reorder_level)
    }

    pub fn total(&self) -> u32 {
        self.available + self.reserved
    }
}

#[derive(Default)]
struct StockLevelsState {
    items: HashMap<AggregateId, StockSummary>,
    position: ProjectionPosition,
}

/// Read model view over every registered stock item.
#[derive(Clone, Default)]
pub struct StockLevelsView {
    state: Arc<RwLock<StockLevelsState>>,
}

impl StockLevelsView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, product_id: &ProductId) -> Option<StockSummary> {
        self.state
            .read()
            .await
            .items
            .get(&StockItem::stream_id(product_id))
            .cloned()
    }

    /// All items, ordered by product id.
    pub async fn all(&self) -> Vec<StockSummary> {
        let mut items: Vec<_> = self.state.read().await.items.values().cloned().collect();
        items.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        items
    }

    /// Active items at or below their reorder level, including those out of
    /// stock.
    pub async fn low_stock(&self) -> Vec<StockSummary> {
        self.matching(|s| s.active && s.level() != StockLevel::Healthy)
            .await
    }

    pub async fn out_of_stock(&self) -> Vec<StockSummary> {
        self.matching(|s| s.active && s.level() == StockLevel::OutOfStock)
            .await
    }

    async fn matching(&self, keep: impl Fn(&StockSummary) -> bool) -> Vec<StockSummary> {
        let mut items: Vec<_> = self
            .state
            .read()
            .await
            .items
            .values()
            .filter(|s| keep(s))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.available.cmp(&b.available).then(a.product_id.cmp(&b.product_id)));
        items
    }
}

#[async_trait]
impl Projection for StockLevelsView {
    fn name(&self) -> &'static str {
        "StockLevelsView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;
        if state.position.has_seen(event.position) {
            return Ok(());
        }
        state.position = state.position.advance_to(event.position);

        if !event.is_from(StockItem::aggregate_type()) {
            return Ok(());
        }

        let stock_event: StockEvent = event
            .decode()
            .map_err(|e| ProjectionError::deserialization(&event.event_type, e))?;

        if let StockEvent::StockItemRegistered(data) = &stock_event {
            state.items.insert(
                event.aggregate_id,
                StockSummary {
                    product_id: data.product_id.clone(),
                    product_name: data.product_name.clone(),
                    sku: data.sku.clone(),
                    warehouse_location: data.warehouse_location.clone(),
                    available: data.initial_quantity,
                    reserved: 0,
                    reorder_level: data.reorder_level,
                    max_stock_level: data.max_stock_level,
                    active: true,
                },
            );
            return Ok(());
        }

        let Some(item) = state.items.get_mut(&event.aggregate_id) else {
            tracing::warn!(aggregate_id = %event.aggregate_id, "stock event for unknown item");
            return Ok(());
        };

        match stock_event {
            StockEvent::StockReserved(m)
            | StockEvent::StockReleased(m)
            | StockEvent::StockConfirmed(m)
            | StockEvent::StockAdded(m) => {
                item.available = m.available_after;
                item.reserved = m.reserved_after;
            }
            StockEvent::ReorderLevelUpdated(data) => item.reorder_level = data.new_level,
            StockEvent::StockItemDeactivated(_) => item.active = false,
            StockEvent::StockItemActivated(_) => item.active = true,
            StockEvent::StockItemRegistered(_)
            | StockEvent::LowStockDetected(_)
            | StockEvent::UnitCostUpdated(_) => {}
        }

        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        *self.state.write().await = StockLevelsState::default();
        Ok(())
    }
}
