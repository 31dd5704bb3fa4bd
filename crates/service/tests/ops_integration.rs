//! Integration tests for the ops server and the service wiring.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use domain::{
    CustomerId, InitiatePayment, InventoryService, Money, OrderId, PaymentService, PaymentStatus,
    ProductId, RegisterStockItem,
};
use event_store::InMemoryEventStore;
use fulfillment_service::{App, Config};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{InMemoryEventBus, InMemoryPaymentGateway, LoggingEventBus, ProcessPaymentRequest};
use tokio::sync::watch;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn test_config() -> Config {
    Config {
        sweep_interval: Duration::from_millis(20),
        outbox_poll_interval: Duration::from_millis(10),
        ..Config::default()
    }
}

async fn setup() -> (Arc<App<InMemoryEventStore>>, InventoryService<InMemoryEventStore>) {
    let store = InMemoryEventStore::new();
    let inventory = InventoryService::new(store.clone());
    inventory
        .register(RegisterStockItem::new("A", "Alpha", 10, 3, 50))
        .await
        .unwrap();
    (Arc::new(App::new(store, test_config())), inventory)
}

async fn get_json(app: &Arc<App<InMemoryEventStore>>, uri: &str) -> (StatusCode, serde_json::Value) {
    let router = fulfillment_service::create_app(Arc::clone(app), metrics_handle());
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health_reports_backlog_and_stock() {
    let (app, _) = setup().await;
    app.coordinator()
        .reserve_line(OrderId::new(), &ProductId::new("A"), 8, chrono::Duration::minutes(5))
        .await
        .unwrap();

    let (status, json) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    // inventory.reserved plus the low-stock alert
    assert_eq!(json["pending_outbox"], 2);
    assert_eq!(json["active_reservations"], 1);
    assert_eq!(json["low_stock_items"], 1);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup().await;
    let handle = metrics_handle();
    app.coordinator()
        .reserve_line(OrderId::new(), &ProductId::new("A"), 1, chrono::Duration::zero())
        .await
        .unwrap();
    app.sweeper().run_once(Utc::now()).await.unwrap();

    let router = fulfillment_service::create_app(Arc::clone(&app), handle);
    let response = router
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("reservations_created_total"));
    assert!(text.contains("sweeper_runs_total"));
}

#[tokio::test]
async fn test_unknown_route() {
    let (app, _) = setup().await;
    let router = fulfillment_service::create_app(app, metrics_handle());
    let response = router
        .oneshot(Request::builder().uri("/orders").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_workers_sweep_and_relay_until_shutdown() {
    let (app, inventory) = setup().await;
    let bus = InMemoryEventBus::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = app.spawn_workers(bus.clone(), shutdown_rx);

    app.coordinator()
        .reserve_line(OrderId::new(), &ProductId::new("A"), 4, chrono::Duration::zero())
        .await
        .unwrap();

    let settled = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let item = inventory.get(&ProductId::new("A")).await.unwrap().unwrap();
            let relayed = bus.messages_on("inventory.reserved").await.len();
            if item.reserved() == 0 && relayed == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(settled.is_ok(), "sweeper and relay did not settle");

    shutdown_tx.send(true).unwrap();
    for worker in workers {
        worker.await.unwrap();
    }
    let item = inventory.get(&ProductId::new("A")).await.unwrap().unwrap();
    assert_eq!((item.available(), item.reserved()), (10, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_logging_bus_drains_the_outbox() {
    let (app, _) = setup().await;
    let bus = LoggingEventBus::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = app.spawn_workers(bus.clone(), shutdown_rx);

    app.coordinator()
        .reserve_line(OrderId::new(), &ProductId::new("A"), 8, chrono::Duration::minutes(5))
        .await
        .unwrap();

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while app.store().undelivered_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(drained.is_ok(), "outbox was not drained");
    // inventory.reserved plus the low-stock alert
    assert_eq!(bus.published(), 2);

    shutdown_tx.send(true).unwrap();
    for worker in workers {
        worker.await.unwrap();
    }
}

#[tokio::test]
async fn test_payment_orchestrator_uses_configured_fraud_threshold() {
    let store = InMemoryEventStore::new();
    let strict = Config {
        fraud_risk_threshold: 0.1,
        ..Config::default()
    };
    let app = App::new(store.clone(), strict);
    let payments = PaymentService::new(store);

    let intent = payments
        .create_intent(
            InitiatePayment::new(OrderId::new(), CustomerId::new(), Money::from_dollars(25))
                .with_client("10.0.0.7", "agent"),
        )
        .await
        .unwrap();
    let intent_id = intent.aggregate.intent_id().unwrap().clone();
    let orchestrator = app.payment_orchestrator(InMemoryPaymentGateway::new());

    // No card verification pushes the score past 0.1
    let err = orchestrator
        .process(&ProcessPaymentRequest::new(intent_id.clone(), "pm_card"))
        .await
        .unwrap_err();
    assert!(matches!(err, saga::SagaError::FraudBlocked { .. }));

    let payment = payments.get(&intent_id).await.unwrap().unwrap();
    assert_eq!(payment.status(), PaymentStatus::Pending);
}
