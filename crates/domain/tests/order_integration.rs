//! Integration tests for the order and payment domain against the event
//! store: full lifecycles, replay, and the optimistic-concurrency race.

use common::{Currency, Money};
use domain::{
    Aggregate, AttachPaymentIntent, AttachReservation, CancelOrder, CompletePayment, ConfirmOrder,
    CreateOrder, CustomerId, DomainError, DomainEvent, InitiatePayment, MarkDelivered,
    MarkRefunded, MarkShipped, OrderItem, OrderService, OrderStatus, PaymentService, Purchaser,
    RecordPaymentRetry, ShippingRule, StartFulfillment, calculate_totals,
};
use event_store::{
    EventEnvelope, EventStore, EventStoreError, ExpectedVersion, InMemoryEventStore, Version,
};

fn cart() -> Vec<OrderItem> {
    vec![
        OrderItem::new("SKU-A", 2, Money::from_cents(1999)),
        OrderItem::new("SKU-B", 1, Money::from_cents(2550)),
    ]
}

fn create_cmd() -> CreateOrder {
    let items = cart();
    let rule = ShippingRule::flat(Money::from_cents(1500)).with_free_above(Money::from_cents(10_000));
    let totals = calculate_totals(&items, 1900, &rule, Money::zero()).unwrap();
    CreateOrder::new(Purchaser::Customer(CustomerId::new()), items, totals)
}

#[tokio::test]
async fn order_and_payment_full_flow() {
    let store = InMemoryEventStore::new();
    let orders = OrderService::new(store.clone());
    let payments = PaymentService::new(store.clone());

    // Checkout creates the order in Draft.
    let cmd = create_cmd();
    let order_id = cmd.order_id;
    orders.create_order(cmd).await.unwrap();

    // Reservation and intent attach while Draft.
    orders
        .attach_reservation(AttachReservation::new(
            order_id,
            "rsv-1",
            chrono::Utc::now() + chrono::Duration::minutes(30),
        ))
        .await
        .unwrap();

    let init = InitiatePayment::new(order_id, Money::from_cents(9292), Currency::Eur, "pi_1");
    let payment_id = init.payment_id;
    payments.initiate(init).await.unwrap();

    orders
        .attach_payment_intent(AttachPaymentIntent::new(order_id, payment_id, "pi_1"))
        .await
        .unwrap();

    // Webhook confirms: payment completed, order confirmed.
    payments
        .complete(CompletePayment::new(payment_id, "ch_1"))
        .await
        .unwrap();
    orders.confirm_order(ConfirmOrder::new(order_id)).await.unwrap();

    // Fulfillment progresses to delivery.
    orders
        .start_fulfillment(StartFulfillment::new(order_id))
        .await
        .unwrap();
    orders
        .mark_shipped(MarkShipped::new(order_id, Some("TRK-42".into())))
        .await
        .unwrap();
    orders.mark_delivered(MarkDelivered::new(order_id)).await.unwrap();

    let order = orders.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Delivered);
    assert_eq!(order.payment_id(), Some(payment_id));
    assert_eq!(order.reservation_ref(), Some("rsv-1"));

    // Full refund flips the order to Refunded.
    payments
        .request_refund(domain::RequestRefund::new(
            payment_id,
            "re_1",
            Money::from_cents(9292),
        ))
        .await
        .unwrap();
    orders
        .mark_refunded(MarkRefunded::new(order_id, "re_1"))
        .await
        .unwrap();

    let order = orders.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Refunded);
    assert!(order.is_terminal());
}

#[tokio::test]
async fn replay_reconstructs_exact_state() {
    let store = InMemoryEventStore::new();
    let orders = OrderService::new(store.clone());

    let cmd = create_cmd();
    let order_id = cmd.order_id;
    let created = orders.create_order(cmd).await.unwrap();

    orders
        .record_payment_retry(RecordPaymentRetry::new(order_id, "card_declined"))
        .await
        .unwrap();
    orders
        .record_payment_retry(RecordPaymentRetry::new(order_id, "card_declined"))
        .await
        .unwrap();

    // A second service over the same store replays the stream from scratch.
    let fresh = OrderService::new(store);
    let replayed = fresh.get_order(order_id).await.unwrap().unwrap();

    assert_eq!(replayed.status(), OrderStatus::Draft);
    assert_eq!(replayed.retry_count(), 2);
    assert_eq!(replayed.totals(), created.aggregate.totals());
    assert_eq!(replayed.items(), created.aggregate.items());
    assert_eq!(replayed.version(), Version::new(3));
}

#[tokio::test]
async fn concurrent_writers_race_exactly_one_wins() {
    let store = InMemoryEventStore::new();
    let orders = OrderService::new(store.clone());

    let cmd = create_cmd();
    let order_id = cmd.order_id;
    let created = orders.create_order(cmd).await.unwrap();
    let version_at_read = created.new_version;

    // Two actors read the order at version 1, then both try to commit:
    // the webhook handler confirming, and the customer cancelling.
    let confirm = created.aggregate.confirm().unwrap();
    let cancel = created.aggregate.cancel("customer request", None).unwrap();

    let to_envelope = |event: &domain::OrderEvent| -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(order_id)
            .aggregate_type("Order")
            .event_type(event.event_type())
            .version(version_at_read.next())
            .payload(event)
            .unwrap()
            .build()
    };

    let first = store
        .append(
            confirm.iter().map(to_envelope).collect(),
            ExpectedVersion::Exact(version_at_read),
        )
        .await;
    assert!(first.is_ok());

    let second = store
        .append(
            cancel.iter().map(to_envelope).collect(),
            ExpectedVersion::Exact(version_at_read),
        )
        .await;
    assert!(matches!(
        second,
        Err(EventStoreError::ConcurrencyConflict { .. })
    ));

    // The winner's transition is the one on the ledger.
    let order = orders.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Confirmed);
}

#[tokio::test]
async fn loser_of_race_sees_conflict_through_service() {
    let store = InMemoryEventStore::new();
    let orders = OrderService::new(store.clone());

    let cmd = create_cmd();
    let order_id = cmd.order_id;
    orders.create_order(cmd).await.unwrap();

    // Cancellation commits first.
    orders
        .cancel_order(CancelOrder::new(order_id, "changed my mind", None))
        .await
        .unwrap();

    // The late confirmation re-reads and fails validation against the new
    // state: a conflict, not a silent drop.
    let err = orders
        .confirm_order(ConfirmOrder::new(order_id))
        .await
        .unwrap_err();
    assert!(err.is_conflict(), "unexpected error: {err}");

    let order = orders.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Cancelled);
}

#[tokio::test]
async fn terminal_order_is_retained_not_deleted() {
    let store = InMemoryEventStore::new();
    let orders = OrderService::new(store.clone());

    let cmd = create_cmd();
    let order_id = cmd.order_id;
    orders.create_order(cmd).await.unwrap();
    orders
        .cancel_order(CancelOrder::new(order_id, "abandoned", None))
        .await
        .unwrap();

    // The full event history stays on the ledger for audit.
    let events = store.events_for_aggregate(order_id).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, "OrderCreated");
    assert_eq!(events[1].event_type, "OrderCancelled");

    let order = orders.get_order(order_id).await.unwrap().unwrap();
    assert!(order.is_terminal());
}

#[tokio::test]
async fn validation_errors_map_to_domain_error() {
    let store = InMemoryEventStore::new();
    let orders = OrderService::new(store);

    let items = vec![OrderItem::new("SKU-A", 0, Money::from_cents(100))];
    let rule = ShippingRule::flat(Money::zero());
    let result = calculate_totals(&items, 1900, &rule, Money::zero());
    assert!(result.is_err());

    // A hand-built command with bad items is rejected by the aggregate too.
    let cmd = CreateOrder::new(
        Purchaser::Customer(CustomerId::new()),
        items,
        domain::Totals::default(),
    );
    let err = orders.create_order(cmd).await.unwrap_err();
    assert!(matches!(err, DomainError::Order(_)));
}
