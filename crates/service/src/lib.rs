//! Fulfillment coordination service.
//!
//! Runs the reservation expiry sweeper and the outbox relay over one event
//! store, and serves `/health` and `/metrics` for operators.

pub mod app;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

pub use app::App;
pub use config::{Config, LogFormat};
pub use error::ApiError;

/// Creates the ops router.
pub fn create_app<S: EventStore + Clone + 'static>(
    app: Arc<App<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .with_state(app)
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}
