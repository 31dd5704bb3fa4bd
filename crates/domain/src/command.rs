//! Command handling infrastructure.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{EventStore, OutboxMessage, Version};

use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::unit_of_work::UnitOfWork;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were generated and persisted.
    pub events: Vec<A::Event>,

    /// The version of the aggregate after the command.
    pub new_version: Version,
}

/// Loads aggregates from the event store and runs commands against them.
///
/// One `execute` is a single optimistic read-modify-write: load, decide,
/// append conditioned on the loaded version. A lost race surfaces as a
/// conflict error; callers wrap the whole call in
/// [`retry_on_conflict`](crate::retry::retry_on_conflict) to reload and
/// decide again.
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an aggregate by replaying its stream.
    ///
    /// If the stream is empty, returns a default instance at version 0.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let events = self.store.get_events_for_aggregate(aggregate_id).await?;

        let mut aggregate = A::default();
        for envelope in events {
            let event: A::Event = envelope.decode()?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        if aggregate.id().is_some() {
            Ok(Some(aggregate))
        } else {
            Ok(None)
        }
    }

    /// Loads an aggregate that must exist.
    pub async fn require(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        self.load_existing(aggregate_id)
            .await?
            .ok_or_else(|| DomainError::AggregateNotFound {
                aggregate_type: A::aggregate_type(),
                aggregate_id: aggregate_id.to_string(),
            })
    }

    /// Executes a command and persists the resulting events.
    ///
    /// The command function receives the current aggregate state and returns
    /// either a list of events to apply, or an error. An empty list persists
    /// nothing.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let aggregate = self.load(aggregate_id).await?;
        self.decide_and_commit(aggregate_id, aggregate, command_fn, |_, _| Ok(Vec::new()))
            .await
    }

    /// Like [`execute`](Self::execute), but fails with `AggregateNotFound`
    /// instead of running the command against an empty aggregate.
    pub async fn execute_existing<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let aggregate = self.require(aggregate_id).await?;
        self.decide_and_commit(aggregate_id, aggregate, command_fn, |_, _| Ok(Vec::new()))
            .await
    }

    /// Executes a command against an existing aggregate and stores the
    /// outbox messages `outbox_fn` derives from the resulting state and events
    /// in the same commit.
    pub async fn execute_with_outbox<F, O>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
        outbox_fn: O,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        O: FnOnce(&A, &[A::Event]) -> Result<Vec<OutboxMessage>, DomainError>,
        DomainError: From<A::Error>,
    {
        let aggregate = self.require(aggregate_id).await?;
        self.decide_and_commit(aggregate_id, aggregate, command_fn, outbox_fn)
            .await
    }

    async fn decide_and_commit<F, O>(
        &self,
        aggregate_id: AggregateId,
        mut aggregate: A,
        command_fn: F,
        outbox_fn: O,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        O: FnOnce(&A, &[A::Event]) -> Result<Vec<OutboxMessage>, DomainError>,
        DomainError: From<A::Error>,
    {
        let current_version = aggregate.version();
        let events = command_fn(&aggregate)?;

        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events,
                new_version: current_version,
            });
        }

        let mut unit = UnitOfWork::new();
        unit.record(aggregate_id, &aggregate, &events)?;

        aggregate.apply_events(events.iter().cloned());
        for message in outbox_fn(&aggregate, &events)? {
            unit.enqueue(message);
        }

        let new_version = unit
            .commit(&self.store)
            .await?
            .into_iter()
            .next()
            .unwrap_or(current_version);
        aggregate.set_version(new_version);

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }
}
