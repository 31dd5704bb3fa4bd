//! Wiring of the coordination components from configuration.

use std::sync::Arc;

use domain::RetryPolicy;
use event_store::EventStore;
use saga::{
    EventBus, ExpirySweeper, InventoryEventHandler, OutboxRelay, PaymentGateway,
    PaymentOrchestrator, ReadModels, ReservationCoordinator, RuleBasedFraudCheck,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;

/// Everything the service runs, built over one store.
pub struct App<S: EventStore + Clone> {
    config: Config,
    store: S,
    read_models: ReadModels<S>,
    coordinator: Arc<ReservationCoordinator<S>>,
}

impl<S: EventStore + Clone + 'static> App<S> {
    pub fn new(store: S, config: Config) -> Self {
        let read_models = ReadModels::new(store.clone());
        let coordinator = ReservationCoordinator::new(store.clone(), read_models.clone())
            .with_retry(RetryPolicy::with_max_attempts(config.conflict_max_attempts))
            .with_default_ttl(config.reservation_ttl);

        Self {
            config,
            store,
            read_models,
            coordinator: Arc::new(coordinator),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn read_models(&self) -> &ReadModels<S> {
        &self.read_models
    }

    pub fn coordinator(&self) -> &Arc<ReservationCoordinator<S>> {
        &self.coordinator
    }

    /// Consumer for `order.placed`, `order.cancelled` and `payment.processed`.
    pub fn event_handler(&self) -> InventoryEventHandler<S> {
        InventoryEventHandler::new(Arc::clone(&self.coordinator))
    }

    /// Payment processing against `gateway`, gated by the rule-based fraud
    /// check at the configured threshold.
    pub fn payment_orchestrator<G: PaymentGateway>(
        &self,
        gateway: G,
    ) -> PaymentOrchestrator<S, RuleBasedFraudCheck, G> {
        PaymentOrchestrator::new(
            self.store.clone(),
            RuleBasedFraudCheck::new(self.config.fraud_risk_threshold),
            gateway,
        )
        .with_gateway_timeout(self.config.gateway_timeout)
        .with_retry(RetryPolicy::with_max_attempts(self.config.conflict_max_attempts))
    }

    pub fn sweeper(&self) -> ExpirySweeper<S> {
        ExpirySweeper::new(Arc::clone(&self.coordinator))
    }

    pub fn relay<B: EventBus>(&self, bus: B) -> OutboxRelay<S, B> {
        OutboxRelay::new(self.store.clone(), bus)
            .with_batch_size(self.config.outbox_batch_size)
            .with_max_attempts(self.config.outbox_max_attempts)
            .with_retention(self.config.outbox_retention)
    }

    /// Starts the expiry sweeper and the outbox relay. Both stop once
    /// `shutdown` turns true.
    pub fn spawn_workers<B: EventBus + 'static>(
        &self,
        bus: B,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let sweeper = self.sweeper();
        let sweep_interval = self.config.sweep_interval;
        let sweeper_shutdown = shutdown.clone();

        let relay = self.relay(bus);
        let poll_interval = self.config.outbox_poll_interval;

        vec![
            tokio::spawn(async move { sweeper.run(sweep_interval, sweeper_shutdown).await }),
            tokio::spawn(async move { relay.run(poll_interval, shutdown).await }),
        ]
    }
}
