//! Query access for coordination: the reservation and stock views kept
//! current from the store before every read.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::OrderId;
use event_store::EventStore;
use projections::{
    ProjectionProcessor, ReservationSummary, ReservationsView, StockLevelsView, StockSummary,
};

use crate::Result;

/// Read models shared by the coordinator, the sweeper and the ops server.
pub struct ReadModels<S: EventStore> {
    processor: Arc<ProjectionProcessor<S>>,
    reservations: ReservationsView,
    stock_levels: StockLevelsView,
}

impl<S: EventStore> Clone for ReadModels<S> {
    fn clone(&self) -> Self {
        Self {
            processor: Arc::clone(&self.processor),
            reservations: self.reservations.clone(),
            stock_levels: self.stock_levels.clone(),
        }
    }
}

impl<S: EventStore> ReadModels<S> {
    pub fn new(store: S) -> Self {
        let reservations = ReservationsView::new();
        let stock_levels = StockLevelsView::new();

        let mut processor = ProjectionProcessor::new(store);
        processor.register(Box::new(reservations.clone()));
        processor.register(Box::new(stock_levels.clone()));

        Self {
            processor: Arc::new(processor),
            reservations,
            stock_levels,
        }
    }

    /// Applies every stored event the views have not seen yet.
    pub async fn catch_up(&self) -> Result<usize> {
        Ok(self.processor.run_catch_up().await?)
    }

    pub async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<ReservationSummary>> {
        self.catch_up().await?;
        Ok(self.reservations.for_order(order_id).await)
    }

    /// ACTIVE reservations at or past their deadline.
    pub async fn overdue_reservations(&self, now: DateTime<Utc>) -> Result<Vec<ReservationSummary>> {
        self.catch_up().await?;
        Ok(self.reservations.expired_active(now).await)
    }

    pub async fn low_stock(&self) -> Result<Vec<StockSummary>> {
        self.catch_up().await?;
        Ok(self.stock_levels.low_stock().await)
    }

    pub fn reservations(&self) -> &ReservationsView {
        &self.reservations
    }

    pub fn stock_levels(&self) -> &StockLevelsView {
        &self.stock_levels
    }
}
