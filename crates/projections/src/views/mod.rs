//! Read model views for the query side.

pub mod reservations;
pub mod stock_levels;

pub use reservations::{ReservationSummary, ReservationsView};
pub use stock_levels::{StockLevelsView, StockSummary};
