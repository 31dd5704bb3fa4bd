//! Read models and projections for the query side.
//!
//! - [`Projection`] trait for processing events into read models
//! - [`ProjectionProcessor`] pages the global log into projections by position
//! - Two views: reservations (sweeper and order lookups) and stock levels

pub mod error;
pub mod processor;
pub mod projection;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
pub use views::{ReservationSummary, ReservationsView, StockLevelsView, StockSummary};
