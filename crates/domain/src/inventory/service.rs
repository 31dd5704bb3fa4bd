//! Inventory service providing the stock item management API.
//!
//! Reservation-driven movements (reserve, release, confirm) are coordinated
//! together with the reservation stream elsewhere; this service covers the
//! operations that touch only the stock item.

use event_store::{EventStore, OutboxMessage};

use crate::command::{CommandHandler, CommandResult};
use crate::contracts::{IntegrationEvent, LowStockAlert};
use crate::error::DomainError;
use crate::retry::{RetryPolicy, retry_on_conflict};
use crate::value_objects::{Money, ProductId};

use super::{RegisterStockItem, StockEvent, StockItem};

/// Service for managing stock items.
pub struct InventoryService<S: EventStore> {
    handler: CommandHandler<S, StockItem>,
    retry: RetryPolicy,
}

impl<S: EventStore> InventoryService<S> {
    pub fn new(store: S) -> Self {
        Self::with_retry(store, RetryPolicy::default())
    }

    pub fn with_retry(store: S, retry: RetryPolicy) -> Self {
        Self {
            handler: CommandHandler::new(store),
            retry,
        }
    }

    pub fn handler(&self) -> &CommandHandler<S, StockItem> {
        &self.handler
    }

    /// Registers a new stock item.
    #[tracing::instrument(skip(self, cmd), fields(product_id = %cmd.product_id))]
    pub async fn register(
        &self,
        cmd: RegisterStockItem,
    ) -> Result<CommandResult<StockItem>, DomainError> {
        let id = StockItem::stream_id(&cmd.product_id);
        let result = self.handler.execute(id, |item| item.register(cmd)).await?;
        tracing::info!(available = result.aggregate.available(), "stock item registered");
        Ok(result)
    }

    /// Returns the stock item for a product, if registered.
    pub async fn get(&self, product_id: &ProductId) -> Result<Option<StockItem>, DomainError> {
        self.handler
            .load_existing(StockItem::stream_id(product_id))
            .await
    }

    /// Receives new units.
    #[tracing::instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CommandResult<StockItem>, DomainError> {
        let id = StockItem::stream_id(product_id);
        retry_on_conflict(&self.retry, || {
            self.handler
                .execute_existing(id, move |item| item.add_stock(quantity))
        })
        .await
    }

    /// Changes the reorder level, publishing a low-stock alert if the item
    /// crosses into low stock.
    #[tracing::instrument(skip(self), fields(product_id = %product_id))]
    pub async fn update_reorder_level(
        &self,
        product_id: &ProductId,
        reorder_level: u32,
    ) -> Result<CommandResult<StockItem>, DomainError> {
        let id = StockItem::stream_id(product_id);
        let result = retry_on_conflict(&self.retry, || {
            self.handler.execute_with_outbox(
                id,
                move |item| item.update_reorder_level(reorder_level),
                low_stock_outbox,
            )
        })
        .await?;
        note_low_stock(&result.aggregate, &result.events);
        Ok(result)
    }

    #[tracing::instrument(skip(self), fields(product_id = %product_id))]
    pub async fn update_unit_cost(
        &self,
        product_id: &ProductId,
        unit_cost: Money,
    ) -> Result<CommandResult<StockItem>, DomainError> {
        let id = StockItem::stream_id(product_id);
        retry_on_conflict(&self.retry, || {
            self.handler
                .execute_existing(id, move |item| item.update_unit_cost(unit_cost))
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(product_id = %product_id))]
    pub async fn deactivate(
        &self,
        product_id: &ProductId,
    ) -> Result<CommandResult<StockItem>, DomainError> {
        let id = StockItem::stream_id(product_id);
        retry_on_conflict(&self.retry, || {
            self.handler.execute_existing(id, |item| item.deactivate())
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(product_id = %product_id))]
    pub async fn activate(
        &self,
        product_id: &ProductId,
    ) -> Result<CommandResult<StockItem>, DomainError> {
        let id = StockItem::stream_id(product_id);
        retry_on_conflict(&self.retry, || {
            self.handler.execute_existing(id, |item| item.activate())
        })
        .await
    }
}

/// Outbox messages for any low-stock crossing among `events`.
pub fn low_stock_outbox(
    item: &StockItem,
    events: &[StockEvent],
) -> Result<Vec<OutboxMessage>, DomainError> {
    match LowStockAlert::from_stock_events(item, events) {
        Some(alert) => Ok(vec![alert.to_outbox()?]),
        None => Ok(vec![]),
    }
}

/// Logs and counts a committed low-stock crossing.
pub fn note_low_stock(item: &StockItem, events: &[StockEvent]) {
    if let Some(low) = events.iter().find_map(StockEvent::as_low_stock) {
        metrics::counter!("low_stock_alerts_total").increment(1);
        tracing::warn!(
            product_id = ?item.product_id(),
            level = %low.level,
            available = low.available,
            reorder_level = low.reorder_level,
            "stock item crossed into low stock"
        );
    }
}
