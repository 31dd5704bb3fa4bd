//! Integration tests for payment intents, cancellation and refunds.

use domain::{
    CustomerId, DomainError, ErrorKind, InitiatePayment, Money, OrderId, PaymentError,
    PaymentIntentId, PaymentMethod, PaymentService, PaymentStatus,
};
use event_store::InMemoryEventStore;

fn service() -> PaymentService<InMemoryEventStore> {
    PaymentService::new(InMemoryEventStore::new())
}

fn intent(amount_cents: i64) -> InitiatePayment {
    InitiatePayment::new(OrderId::new(), CustomerId::new(), Money::from_cents(amount_cents))
        .with_method(PaymentMethod::CreditCard, "pm_card_visa")
        .with_client("203.0.113.7", "test-agent")
}

#[tokio::test]
async fn create_intent_generates_id_and_persists() {
    let service = service();
    let result = service.create_intent(intent(2500)).await.unwrap();
    let intent_id = result.aggregate.intent_id().unwrap().clone();

    assert!(intent_id.as_str().starts_with("pi_"));
    let loaded = service.get(&intent_id).await.unwrap().unwrap();
    assert_eq!(loaded.status(), PaymentStatus::Pending);
    assert_eq!(loaded.amount().cents(), 2500);
    assert_eq!(loaded.payment_method_id(), Some("pm_card_visa"));
    assert_eq!(loaded.ip_address(), Some("203.0.113.7"));
}

#[tokio::test]
async fn duplicate_intent_id_is_rejected() {
    let service = service();
    let id = PaymentIntentId::new("pi_fixed");
    service
        .create_intent(intent(100).with_intent_id(id.clone()))
        .await
        .unwrap();

    let err = service
        .create_intent(intent(100).with_intent_id(id))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Payment(PaymentError::AlreadyInitiated)));
}

#[tokio::test]
async fn non_positive_amount_is_a_validation_error() {
    let err = service().create_intent(intent(0)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn cancel_pending_payment() {
    let service = service();
    let created = service.create_intent(intent(100)).await.unwrap();
    let id = created.aggregate.intent_id().unwrap().clone();

    let result = service
        .cancel(&id, Some("customer abandoned checkout".into()))
        .await
        .unwrap();
    assert_eq!(result.aggregate.status(), PaymentStatus::Cancelled);

    let err = service.cancel(&id, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BusinessRule);
}

#[tokio::test]
async fn refund_of_unsettled_payment_is_illegal() {
    let service = service();
    let created = service.create_intent(intent(100)).await.unwrap();
    let id = created.aggregate.intent_id().unwrap().clone();

    let err = service.refund(&id, Money::from_cents(10)).await.unwrap_err();
    assert!(matches!(
        err,
        DomainError::Payment(PaymentError::IllegalPaymentState {
            current: PaymentStatus::Pending,
            ..
        })
    ));
}

#[tokio::test]
async fn missing_payment_is_not_found() {
    let err = service()
        .cancel(&PaymentIntentId::new("pi_missing"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
