//! Shared types for the fulfillment coordination workspace.

mod types;

pub use types::AggregateId;
