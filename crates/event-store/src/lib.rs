//! Event store for the fulfillment coordination workspace.
//!
//! Every aggregate is an append-only stream of [`EventEnvelope`]s whose
//! version is the optimistic-concurrency token. A [`Commit`] appends to
//! several streams and enqueues outbox messages in one atomic unit, so a
//! state change and the integration events it causes are stored together.

pub mod error;
pub mod event;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use outbox::{OutboxId, OutboxMessage};
pub use postgres::PostgresEventStore;
pub use store::{AppendOptions, Commit, EventStore, EventStoreExt, StreamAppend};
