//! End-to-end checkout saga tests over in-memory collaborators.

use std::sync::Arc;

use chrono::Utc;
use common::{AggregateId, Money};
use domain::{CustomerId, OrderItem, OrderStatus, PaymentStatus, Purchaser};
use event_store::InMemoryEventStore;
use saga::{
    CheckoutAccepted, CheckoutConfig, CheckoutOrchestrator, CheckoutRequest, ErrorKind,
    InMemoryEventBus, InMemoryInvoiceGenerator, InMemoryNotificationSender,
    InMemoryPaymentGateway, InMemoryProcessedEvents, InMemoryStockService, SagaError,
    WebhookOutcome, WebhookVerifier, topics,
};

const WEBHOOK_SECRET: &[u8] = b"whsec_integration_test";

struct Harness {
    orchestrator:
        CheckoutOrchestrator<InMemoryEventStore, InMemoryStockService, InMemoryPaymentGateway>,
    stock: InMemoryStockService,
    gateway: InMemoryPaymentGateway,
    invoices: Arc<InMemoryInvoiceGenerator>,
    notifier: Arc<InMemoryNotificationSender>,
    bus: Arc<InMemoryEventBus>,
    verifier: WebhookVerifier,
}

fn setup() -> Harness {
    setup_with_config(CheckoutConfig {
        tax_rate_bps: 1900,
        shipping: domain::ShippingRule::flat(Money::from_cents(1500))
            .with_free_above(Money::from_cents(10_000)),
        ..CheckoutConfig::default()
    })
}

fn setup_with_config(config: CheckoutConfig) -> Harness {
    let store = InMemoryEventStore::new();
    let stock = InMemoryStockService::new();
    let gateway = InMemoryPaymentGateway::new();
    let invoices = Arc::new(InMemoryInvoiceGenerator::new());
    let notifier = Arc::new(InMemoryNotificationSender::new());
    let bus = Arc::new(InMemoryEventBus::new());
    let verifier = WebhookVerifier::new(WEBHOOK_SECRET.to_vec());
    let processed = Arc::new(InMemoryProcessedEvents::new());

    stock.set_stock("SKU-A", 10);
    stock.set_stock("SKU-B", 10);

    let orchestrator = CheckoutOrchestrator::new(
        store,
        stock.clone(),
        gateway.clone(),
        invoices.clone(),
        notifier.clone(),
        bus.clone(),
        verifier.clone(),
        processed,
        config,
    );

    Harness {
        orchestrator,
        stock,
        gateway,
        invoices,
        notifier,
        bus,
        verifier,
    }
}

fn cart() -> Vec<OrderItem> {
    vec![
        OrderItem::new("SKU-A", 2, Money::from_cents(1999)),
        OrderItem::new("SKU-B", 1, Money::from_cents(2550)),
    ]
}

fn request() -> CheckoutRequest {
    CheckoutRequest {
        purchaser: Purchaser::Customer(CustomerId::new()),
        items: cart(),
        discount: Money::zero(),
    }
}

fn webhook_payload(accepted: &CheckoutAccepted, event_id: &str, body: serde_json::Value) -> Vec<u8> {
    let mut payload = serde_json::json!({
        "event_id": event_id,
        "intent_id": accepted.intent.intent_id,
        "order_id": accepted.order_id,
        "payment_id": accepted.intent.payment_id,
    });
    payload
        .as_object_mut()
        .unwrap()
        .extend(body.as_object().unwrap().clone());
    payload.to_string().into_bytes()
}

fn success_payload(accepted: &CheckoutAccepted, event_id: &str) -> Vec<u8> {
    webhook_payload(
        accepted,
        event_id,
        serde_json::json!({"event_type": "payment_succeeded", "charge_id": "ch_000001"}),
    )
}

fn failure_payload(
    accepted: &CheckoutAccepted,
    event_id: &str,
    reason: &str,
    retryable: bool,
) -> Vec<u8> {
    webhook_payload(
        accepted,
        event_id,
        serde_json::json!({"event_type": "payment_failed", "reason": reason, "retryable": retryable}),
    )
}

#[tokio::test]
async fn checkout_reserves_then_opens_intent() {
    let h = setup();

    let accepted = h.orchestrator.checkout(request()).await.unwrap();

    // Reference cart: 65.48 + 12.44 tax + 15.00 shipping = 92.92.
    assert_eq!(accepted.totals.subtotal.cents(), 6548);
    assert_eq!(accepted.totals.tax.cents(), 1244);
    assert_eq!(accepted.totals.total.cents(), 9292);
    assert!(accepted.order_number.starts_with("ORD-"));
    assert!(accepted.intent.expires_at > Utc::now());

    let order = h
        .orchestrator
        .get_order(accepted.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Draft);
    assert!(order.reservation_ref().is_some());
    assert_eq!(order.payment_intent_id(), Some(accepted.intent.intent_id.as_str()));

    // Inventory held but not deducted.
    assert_eq!(h.stock.available(&"SKU-A".into()), 8);
    assert_eq!(h.stock.confirmed_count(), 0);
    assert_eq!(h.bus.published_on(topics::ORDER_CREATED), 1);
}

#[tokio::test]
async fn success_webhook_confirms_order_end_to_end() {
    let h = setup();
    let accepted = h.orchestrator.checkout(request()).await.unwrap();

    let payload = success_payload(&accepted, "evt_1");
    let signature = h.verifier.sign(&payload);

    let outcome = h
        .orchestrator
        .handle_payment_webhook(&payload, &signature)
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Processed);

    let order = h
        .orchestrator
        .get_order(accepted.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Confirmed);

    let payment = h
        .orchestrator
        .get_payment(accepted.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status(), PaymentStatus::Completed);
    assert_eq!(payment.charge_id(), Some("ch_000001"));

    // Holds became deductions; invoice fired; events published.
    assert_eq!(h.stock.confirmed_count(), 2);
    assert_eq!(h.invoices.generated_count(), 1);
    assert_eq!(h.bus.published_on(topics::ORDER_CONFIRMED), 1);
    assert_eq!(h.bus.published_on(topics::PAYMENT_COMPLETED), 1);
    assert_eq!(h.notifier.count_for("order_confirmed"), 1);
}

#[tokio::test]
async fn duplicate_webhook_delivery_is_a_no_op() {
    let h = setup();
    let accepted = h.orchestrator.checkout(request()).await.unwrap();

    let payload = success_payload(&accepted, "evt_1");
    let signature = h.verifier.sign(&payload);

    let first = h
        .orchestrator
        .handle_payment_webhook(&payload, &signature)
        .await
        .unwrap();
    let second = h
        .orchestrator
        .handle_payment_webhook(&payload, &signature)
        .await
        .unwrap();

    assert_eq!(first, WebhookOutcome::Processed);
    assert_eq!(second, WebhookOutcome::Replayed);

    // Invoice fired exactly once despite double delivery.
    assert_eq!(h.invoices.generated_count(), 1);
    assert_eq!(h.bus.published_on(topics::ORDER_CONFIRMED), 1);
    assert_eq!(h.notifier.count_for("order_confirmed"), 1);
}

#[tokio::test]
async fn unsigned_webhook_mutates_nothing() {
    let h = setup();
    let accepted = h.orchestrator.checkout(request()).await.unwrap();

    let payload = success_payload(&accepted, "evt_1");

    let err = h
        .orchestrator
        .handle_payment_webhook(&payload, "deadbeef")
        .await
        .unwrap_err();
    assert!(matches!(err, SagaError::InvalidSignature));
    assert_eq!(err.kind(), ErrorKind::Security);

    // No state moved anywhere.
    let order = h
        .orchestrator
        .get_order(accepted.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Draft);
    let payment = h
        .orchestrator
        .get_payment(accepted.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status(), PaymentStatus::Pending);
    assert_eq!(h.stock.confirmed_count(), 0);
    assert_eq!(h.invoices.generated_count(), 0);
}

#[tokio::test]
async fn out_of_stock_releases_partial_holds_and_names_sku() {
    let h = setup();
    h.stock.set_stock("SKU-B", 0);

    let err = h.orchestrator.checkout(request()).await.unwrap_err();

    match &err {
        SagaError::OutOfStock { skus } => assert_eq!(skus, &vec!["SKU-B".to_string()]),
        other => panic!("expected OutOfStock, got {other}"),
    }
    assert_eq!(err.kind(), ErrorKind::BusinessRule);

    // SKU-A's hold rolled back; the gateway was never touched.
    assert_eq!(h.stock.available(&"SKU-A".into()), 10);
    assert_eq!(h.stock.hold_count(), 0);
    assert_eq!(h.gateway.intent_count(), 0);
    assert_eq!(h.bus.published_on(topics::ORDER_CANCELLED), 1);
}

#[tokio::test]
async fn intent_failure_releases_reservation_and_cancels() {
    let h = setup();
    // Exhaust all retry attempts.
    h.gateway.fail_next_intents(10);

    let err = h.orchestrator.checkout(request()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalService);

    // Compensation: holds released, order cancelled.
    assert_eq!(h.stock.available(&"SKU-A".into()), 10);
    assert_eq!(h.stock.available(&"SKU-B".into()), 10);
    assert_eq!(h.bus.published_on(topics::ORDER_CANCELLED), 1);
}

#[tokio::test]
async fn retryable_decline_keeps_order_draft() {
    let h = setup();
    let accepted = h.orchestrator.checkout(request()).await.unwrap();

    let payload = failure_payload(&accepted, "evt_1", "insufficient_funds", true);
    let signature = h.verifier.sign(&payload);
    h.orchestrator
        .handle_payment_webhook(&payload, &signature)
        .await
        .unwrap();

    let order = h
        .orchestrator
        .get_order(accepted.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Draft);
    assert_eq!(order.retry_count(), 1);

    let payment = h
        .orchestrator
        .get_payment(accepted.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status(), PaymentStatus::Failed);
    assert_eq!(payment.failure_reason(), Some("insufficient_funds"));

    // Holds were released while the customer decides.
    assert_eq!(h.stock.available(&"SKU-A".into()), 10);
    assert_eq!(h.bus.published_on(topics::PAYMENT_FAILED), 1);
    assert_eq!(h.bus.published_on(topics::ORDER_CANCELLED), 0);
}

#[tokio::test]
async fn terminal_decline_cancels_order() {
    let h = setup();
    let accepted = h.orchestrator.checkout(request()).await.unwrap();

    let payload = failure_payload(&accepted, "evt_1", "fraud_suspected", false);
    let signature = h.verifier.sign(&payload);
    h.orchestrator
        .handle_payment_webhook(&payload, &signature)
        .await
        .unwrap();

    let order = h
        .orchestrator
        .get_order(accepted.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Cancelled);

    assert_eq!(h.bus.published_on(topics::PAYMENT_FAILED), 1);
    assert_eq!(h.bus.published_on(topics::ORDER_CANCELLED), 1);
    assert_eq!(h.stock.available(&"SKU-A".into()), 10);
}

#[tokio::test]
async fn cancel_then_webhook_surfaces_conflict() {
    let h = setup();
    let accepted = h.orchestrator.checkout(request()).await.unwrap();

    // Customer cancels first.
    h.orchestrator
        .cancel_order(accepted.order_id, Some("customer".to_string()))
        .await
        .unwrap();

    // The late confirmation loses: conflict, not a silent overwrite.
    let payload = success_payload(&accepted, "evt_1");
    let signature = h.verifier.sign(&payload);
    let err = h
        .orchestrator
        .handle_payment_webhook(&payload, &signature)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);

    let order = h
        .orchestrator
        .get_order(accepted.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Cancelled);
    assert_eq!(h.invoices.generated_count(), 0);
}

#[tokio::test]
async fn webhook_then_cancel_surfaces_conflict_to_customer() {
    let h = setup();
    let accepted = h.orchestrator.checkout(request()).await.unwrap();

    let payload = success_payload(&accepted, "evt_1");
    let signature = h.verifier.sign(&payload);
    h.orchestrator
        .handle_payment_webhook(&payload, &signature)
        .await
        .unwrap();

    // Confirmed orders can still be cancelled per the transition table —
    // but a Shipped one cannot.
    h.orchestrator
        .start_fulfillment(accepted.order_id)
        .await
        .unwrap();
    h.orchestrator
        .mark_shipped(accepted.order_id, None)
        .await
        .unwrap();

    let err = h
        .orchestrator
        .cancel_order(accepted.order_id, Some("customer".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);
}

#[tokio::test]
async fn full_refund_after_delivery_marks_order_refunded() {
    let h = setup();
    let accepted = h.orchestrator.checkout(request()).await.unwrap();

    let payload = success_payload(&accepted, "evt_1");
    let signature = h.verifier.sign(&payload);
    h.orchestrator
        .handle_payment_webhook(&payload, &signature)
        .await
        .unwrap();

    h.orchestrator.start_fulfillment(accepted.order_id).await.unwrap();
    h.orchestrator
        .mark_shipped(accepted.order_id, Some("TRK-1".into()))
        .await
        .unwrap();
    h.orchestrator.mark_delivered(accepted.order_id).await.unwrap();

    let outcome = h
        .orchestrator
        .admin_refund(accepted.order_id, Money::from_cents(9292))
        .await
        .unwrap();
    assert!(outcome.fully_refunded);

    let order = h
        .orchestrator
        .get_order(accepted.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Refunded);
    assert_eq!(h.gateway.refunds().len(), 1);
}

#[tokio::test]
async fn oversized_refund_rejected_with_detail() {
    let h = setup();
    let accepted = h.orchestrator.checkout(request()).await.unwrap();

    let payload = success_payload(&accepted, "evt_1");
    let signature = h.verifier.sign(&payload);
    h.orchestrator
        .handle_payment_webhook(&payload, &signature)
        .await
        .unwrap();

    // Captured 92.92; request 150.00.
    let err = h
        .orchestrator
        .admin_refund(accepted.order_id, Money::from_cents(15_000))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SagaError::RefundExceedsCaptured {
            requested: 15_000,
            refundable: 9292,
        }
    ));
    assert_eq!(err.kind(), ErrorKind::BusinessRule);

    // Order and gateway untouched.
    let order = h
        .orchestrator
        .get_order(accepted.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Confirmed);
    assert!(h.gateway.refunds().is_empty());
}

#[tokio::test]
async fn refund_without_payment_is_not_found() {
    let h = setup();
    let err = h
        .orchestrator
        .admin_refund(AggregateId::new(), Money::from_cents(100))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn sweep_cancels_expired_draft_checkouts() {
    let h = setup_with_config(CheckoutConfig {
        reservation_ttl: chrono::Duration::minutes(-1), // expires immediately
        tax_rate_bps: 1900,
        shipping: domain::ShippingRule::flat(Money::from_cents(1500)),
        ..CheckoutConfig::default()
    });

    let accepted = h.orchestrator.checkout(request()).await.unwrap();

    let swept = h
        .orchestrator
        .sweep_expired_checkouts(Utc::now())
        .await
        .unwrap();
    assert_eq!(swept, 1);

    let order = h
        .orchestrator
        .get_order(accepted.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Cancelled);

    // Holds back in the pool; reservation marked released.
    assert_eq!(h.stock.available(&"SKU-A".into()), 10);

    // A second sweep finds nothing.
    let swept = h
        .orchestrator
        .sweep_expired_checkouts(Utc::now())
        .await
        .unwrap();
    assert_eq!(swept, 0);
}

#[tokio::test]
async fn sweep_leaves_live_checkouts_alone() {
    let h = setup();
    let accepted = h.orchestrator.checkout(request()).await.unwrap();

    let swept = h
        .orchestrator
        .sweep_expired_checkouts(Utc::now())
        .await
        .unwrap();
    assert_eq!(swept, 0);

    let order = h
        .orchestrator
        .get_order(accepted.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status(), OrderStatus::Draft);
}

#[tokio::test]
async fn concurrent_checkouts_for_last_unit() {
    let h = setup();
    h.stock.set_stock("SKU-A", 2);
    h.stock.set_stock("SKU-B", 1);

    let orchestrator = Arc::new(h.orchestrator);
    let a = Arc::clone(&orchestrator);
    let b = Arc::clone(&orchestrator);

    let (ra, rb) = tokio::join!(
        a.checkout(request()),
        b.checkout(request()),
    );

    let results = [ra, rb];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let failures = results
        .iter()
        .filter(|r| matches!(r, Err(SagaError::OutOfStock { .. })))
        .count();

    assert_eq!(successes, 1, "exactly one checkout wins the last unit");
    assert_eq!(failures, 1, "the loser gets a stock failure");

    // The loser's partial holds were rolled back: winner holds 2 of
    // SKU-A's stock and the single SKU-B.
    assert_eq!(h.stock.available(&"SKU-B".into()), 0);
    assert_eq!(h.stock.hold_count(), 2);
}

#[tokio::test]
async fn empty_cart_rejected_before_any_side_effect() {
    let h = setup();
    let err = h
        .orchestrator
        .checkout(CheckoutRequest {
            purchaser: Purchaser::Customer(CustomerId::new()),
            items: vec![],
            discount: Money::zero(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(h.stock.hold_count(), 0);
    assert_eq!(h.gateway.intent_count(), 0);
    assert!(h.bus.published().is_empty());
}

#[tokio::test]
async fn guest_checkout_notifies_by_email() {
    let h = setup();
    let accepted = h
        .orchestrator
        .checkout(CheckoutRequest {
            purchaser: Purchaser::guest("jane@example.com").unwrap(),
            items: cart(),
            discount: Money::zero(),
        })
        .await
        .unwrap();

    let payload = success_payload(&accepted, "evt_1");
    let signature = h.verifier.sign(&payload);
    h.orchestrator
        .handle_payment_webhook(&payload, &signature)
        .await
        .unwrap();

    let sent = h.notifier.sent();
    assert!(sent
        .iter()
        .any(|(to, event)| to == "jane@example.com" && event == "order_confirmed"));
}
