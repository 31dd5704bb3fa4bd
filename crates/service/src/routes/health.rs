//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use event_store::EventStore;
use serde::Serialize;

use crate::app::App;
use crate::error::ApiError;

/// Pending messages counted per health check; the count saturates here.
const OUTBOX_SCAN_LIMIT: usize = 1000;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Undelivered outbox messages still within their attempt budget.
    pub pending_outbox: usize,
    pub active_reservations: usize,
    pub low_stock_items: usize,
}

/// GET /health: store reachability, outbox backlog and stock warnings.
pub async fn check<S: EventStore + Clone + 'static>(
    State(app): State<Arc<App<S>>>,
) -> Result<Json<HealthResponse>, ApiError> {
    let pending = app
        .store()
        .pending_outbox(OUTBOX_SCAN_LIMIT, app.config().outbox_max_attempts)
        .await?;
    let low_stock = app.read_models().low_stock().await?;
    let active_reservations = app.read_models().reservations().active_count().await;

    metrics::gauge!("outbox_pending_messages").set(pending.len() as f64);
    metrics::gauge!("reservations_active").set(active_reservations as f64);

    Ok(Json(HealthResponse {
        status: "ok",
        pending_outbox: pending.len(),
        active_reservations,
        low_stock_items: low_stock.len(),
    }))
}
