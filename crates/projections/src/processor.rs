//! Projection processor for feeding events to projections.

use event_store::{EventEnvelope, EventStore};

use crate::Result;
use crate::projection::Projection;

const DEFAULT_BATCH_SIZE: usize = 500;

/// Processes events from an event store and delivers them to projections.
///
/// The processor supports:
/// - Catch-up: pages through the global log from the lowest projection position
/// - Single event delivery: delivers a new event to all projections
/// - Rebuild: resets all projections and replays from scratch
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
    batch_size: usize,
}

impl<S: EventStore> ProjectionProcessor<S> {
    /// Creates a new processor with the given event store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Sets how many events are read per page during catch-up.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Registers a projection with this processor.
    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    /// Returns the number of registered projections.
    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Delivers every event no projection has seen yet. Returns the number of
    /// events read from the store.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<usize> {
        let Some(mut after) = self.lowest_position().await else {
            return Ok(0);
        };
        let mut read = 0;

        loop {
            let page = self.store.read_all_from(after, self.batch_size).await?;
            let Some(last) = page.last() else { break };
            after = last.position;
            read += page.len();

            for event in &page {
                for projection in &self.projections {
                    if !projection.position().await.has_seen(event.position) {
                        projection.handle(event).await?;
                        metrics::counter!("projections_events_processed").increment(1);
                    }
                }
            }

            if page.len() < self.batch_size {
                break;
            }
        }

        if read > 0 {
            tracing::debug!(events_read = read, position = after, "catch-up complete");
        }
        Ok(read)
    }

    /// Delivers a single event to all registered projections.
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn process_event(&self, event: &EventEnvelope) -> Result<()> {
        for projection in &self.projections {
            projection.handle(event).await?;
        }
        Ok(())
    }

    /// Resets all projections and replays all events from the store.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<usize> {
        for projection in &self.projections {
            projection.reset().await?;
        }
        self.run_catch_up().await
    }

    async fn lowest_position(&self) -> Option<i64> {
        let mut lowest = None;
        for projection in &self.projections {
            let position = projection.position().await.last_position;
            lowest = Some(lowest.map_or(position, |l: i64| l.min(position)));
        }
        lowest
    }
}
