//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

use super::{
    OrderError, OrderEvent, OrderItem, OrderNumber, OrderStatus, Purchaser, Totals,
    events::OrderCreatedData,
};

/// Order aggregate root.
///
/// Created in Draft from a validated cart and driven through the lifecycle
/// state machine by the checkout orchestrator. Line items and prices are a
/// snapshot taken at creation; only status and reference fields change
/// afterwards. Orders are never deleted — cancelled and refunded orders
/// stay on the ledger for audit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    order_number: Option<OrderNumber>,
    purchaser: Option<Purchaser>,
    status: OrderStatus,
    items: Vec<OrderItem>,
    totals: Totals,

    /// Local payment aggregate opened for this order.
    payment_id: Option<AggregateId>,
    /// Gateway intent identifier.
    payment_intent_id: Option<String>,
    /// Inventory reservation reference.
    reservation_ref: Option<String>,
    reservation_expires_at: Option<DateTime<Utc>>,

    /// Number of retryable payment declines seen while in Draft.
    retry_count: u32,
    admin_note: Option<String>,

    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderCreated(data) => self.apply_created(data),
            OrderEvent::ReservationAttached(data) => {
                self.reservation_ref = Some(data.reservation_ref);
                self.reservation_expires_at = Some(data.expires_at);
                self.updated_at = Some(data.attached_at);
            }
            OrderEvent::PaymentIntentAttached(data) => {
                self.payment_id = Some(data.payment_id);
                self.payment_intent_id = Some(data.intent_id);
                self.updated_at = Some(data.attached_at);
            }
            OrderEvent::OrderConfirmed(data) => {
                self.status = OrderStatus::Confirmed;
                self.updated_at = Some(data.confirmed_at);
            }
            OrderEvent::PaymentRetryRecorded(data) => {
                self.retry_count += 1;
                self.updated_at = Some(data.recorded_at);
            }
            OrderEvent::FulfillmentStarted(data) => {
                self.status = OrderStatus::Processing;
                self.updated_at = Some(data.started_at);
            }
            OrderEvent::OrderShipped(data) => {
                self.status = OrderStatus::Shipped;
                self.updated_at = Some(data.shipped_at);
            }
            OrderEvent::OrderDelivered(data) => {
                self.status = OrderStatus::Delivered;
                self.updated_at = Some(data.delivered_at);
            }
            OrderEvent::OrderCancelled(data) => {
                self.status = OrderStatus::Cancelled;
                self.updated_at = Some(data.cancelled_at);
            }
            OrderEvent::OrderRefunded(data) => {
                self.status = OrderStatus::Refunded;
                self.updated_at = Some(data.refunded_at);
            }
            OrderEvent::AdminNoteSet(data) => {
                self.admin_note = Some(data.note);
                self.updated_at = Some(data.set_at);
            }
        }
    }
}

// Query methods
impl Order {
    pub fn order_number(&self) -> Option<&OrderNumber> {
        self.order_number.as_ref()
    }

    pub fn purchaser(&self) -> Option<&Purchaser> {
        self.purchaser.as_ref()
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn payment_id(&self) -> Option<AggregateId> {
        self.payment_id
    }

    pub fn payment_intent_id(&self) -> Option<&str> {
        self.payment_intent_id.as_deref()
    }

    pub fn reservation_ref(&self) -> Option<&str> {
        self.reservation_ref.as_deref()
    }

    pub fn reservation_expires_at(&self) -> Option<DateTime<Utc>> {
        self.reservation_expires_at
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn admin_note(&self) -> Option<&str> {
        self.admin_note.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True for Draft orders whose reservation lapsed before `now`.
    pub fn reservation_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatus::Draft
            && self
                .reservation_expires_at
                .is_some_and(|expires| expires < now)
    }
}

// Command methods (validate, then return events)
impl Order {
    /// Creates the order from a validated cart snapshot.
    ///
    /// The totals must satisfy the monetary invariant; they were produced
    /// by the total calculator but are revalidated here so a corrupted
    /// caller can never persist an inconsistent order.
    pub fn create(
        &self,
        order_id: AggregateId,
        purchaser: Purchaser,
        items: Vec<OrderItem>,
        totals: Totals,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyCreated);
        }
        if items.is_empty() {
            return Err(OrderError::EmptyOrder);
        }
        for item in &items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    sku: item.sku.to_string(),
                    quantity: item.quantity,
                });
            }
            if !item.unit_price.is_positive() {
                return Err(OrderError::InvalidUnitPrice {
                    sku: item.sku.to_string(),
                    price: item.unit_price.cents(),
                });
            }
        }
        if !totals.is_consistent() {
            return Err(OrderError::InconsistentTotals);
        }

        Ok(vec![OrderEvent::order_created(
            order_id, purchaser, items, totals,
        )])
    }

    /// Records the inventory reservation reference. Draft only.
    pub fn attach_reservation(
        &self,
        reservation_ref: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_status(OrderStatus::Draft)?;
        Ok(vec![OrderEvent::reservation_attached(
            reservation_ref,
            expires_at,
        )])
    }

    /// Records the payment intent reference. Draft only.
    pub fn attach_payment_intent(
        &self,
        payment_id: AggregateId,
        intent_id: impl Into<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_status(OrderStatus::Draft)?;
        Ok(vec![OrderEvent::payment_intent_attached(
            payment_id, intent_id,
        )])
    }

    /// Confirms the order after payment capture. Draft → Confirmed.
    pub fn confirm(&self) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_transition(OrderStatus::Confirmed)?;
        Ok(vec![OrderEvent::order_confirmed()])
    }

    /// Records a retryable payment decline; the order stays Draft and the
    /// retry counter increments.
    pub fn record_payment_retry(
        &self,
        reason: impl Into<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_status(OrderStatus::Draft)?;
        Ok(vec![OrderEvent::payment_retry_recorded(reason)])
    }

    /// Starts fulfillment. Confirmed → Processing.
    pub fn start_fulfillment(&self) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_transition(OrderStatus::Processing)?;
        Ok(vec![OrderEvent::fulfillment_started()])
    }

    /// Marks the order shipped. Processing → Shipped.
    pub fn mark_shipped(
        &self,
        tracking_number: Option<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_transition(OrderStatus::Shipped)?;
        Ok(vec![OrderEvent::order_shipped(tracking_number)])
    }

    /// Marks the order delivered. Shipped → Delivered.
    pub fn mark_delivered(&self) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_transition(OrderStatus::Delivered)?;
        Ok(vec![OrderEvent::order_delivered()])
    }

    /// Cancels the order from any state the transition table allows.
    pub fn cancel(
        &self,
        reason: impl Into<String>,
        cancelled_by: Option<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_transition(OrderStatus::Cancelled)?;
        Ok(vec![OrderEvent::order_cancelled(reason, cancelled_by)])
    }

    /// Marks the order fully refunded. Shipped/Delivered → Refunded.
    pub fn mark_refunded(
        &self,
        refund_ref: impl Into<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_transition(OrderStatus::Refunded)?;
        Ok(vec![OrderEvent::order_refunded(refund_ref)])
    }

    /// Sets the free-text admin note. Allowed in any state.
    pub fn set_admin_note(&self, note: impl Into<String>) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_none() {
            return Err(OrderError::NotCreated);
        }
        Ok(vec![OrderEvent::admin_note_set(note)])
    }

    fn ensure_transition(&self, to: OrderStatus) -> Result<(), OrderError> {
        if self.id.is_none() {
            return Err(OrderError::NotCreated);
        }
        if OrderStatus::can_transition(self.status, to) {
            Ok(())
        } else {
            Err(OrderError::InvalidTransition {
                from: self.status,
                to,
            })
        }
    }

    fn require_status(&self, status: OrderStatus) -> Result<(), OrderError> {
        if self.id.is_none() {
            return Err(OrderError::NotCreated);
        }
        if self.status == status {
            Ok(())
        } else {
            Err(OrderError::UnexpectedStatus {
                expected: status,
                actual: self.status,
            })
        }
    }

    fn apply_created(&mut self, data: OrderCreatedData) {
        self.id = Some(data.order_id);
        self.order_number = Some(data.order_number);
        self.purchaser = Some(data.purchaser);
        self.status = OrderStatus::Draft;
        self.items = data.items;
        self.totals = data.totals;
        self.created_at = Some(data.created_at);
        self.updated_at = Some(data.created_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregate;
    use crate::order::{CustomerId, calculate_totals, totals::ShippingRule};
    use common::Money;

    fn cart() -> Vec<OrderItem> {
        vec![
            OrderItem::new("SKU-A", 2, Money::from_cents(1999)),
            OrderItem::new("SKU-B", 1, Money::from_cents(2550)),
        ]
    }

    fn cart_totals(items: &[OrderItem]) -> Totals {
        let rule = ShippingRule::flat(Money::from_cents(1500));
        calculate_totals(items, 1900, &rule, Money::zero()).unwrap()
    }

    fn draft_order() -> (Order, AggregateId) {
        let mut order = Order::default();
        let order_id = AggregateId::new();
        let items = cart();
        let totals = cart_totals(&items);
        let events = order
            .create(
                order_id,
                Purchaser::Customer(CustomerId::new()),
                items,
                totals,
            )
            .unwrap();
        order.apply_events(events);
        (order, order_id)
    }

    fn confirmed_order() -> Order {
        let (mut order, _) = draft_order();
        order.apply_events(order.confirm().unwrap());
        order
    }

    #[test]
    fn create_snapshots_cart() {
        let (order, order_id) = draft_order();
        assert_eq!(order.id(), Some(order_id));
        assert_eq!(order.status(), OrderStatus::Draft);
        assert_eq!(order.items().len(), 2);
        assert_eq!(order.totals().total.cents(), 9292);
        assert!(order.order_number().is_some());
        assert!(order.created_at().is_some());
        assert_eq!(order.retry_count(), 0);
    }

    #[test]
    fn create_twice_fails() {
        let (order, _) = draft_order();
        let items = cart();
        let totals = cart_totals(&items);
        let result = order.create(
            AggregateId::new(),
            Purchaser::Customer(CustomerId::new()),
            items,
            totals,
        );
        assert!(matches!(result, Err(OrderError::AlreadyCreated)));
    }

    #[test]
    fn create_rejects_inconsistent_totals() {
        let order = Order::default();
        let items = cart();
        let mut totals = cart_totals(&items);
        totals.total += Money::from_cents(1);

        let result = order.create(
            AggregateId::new(),
            Purchaser::Customer(CustomerId::new()),
            items,
            totals,
        );
        assert!(matches!(result, Err(OrderError::InconsistentTotals)));
    }

    #[test]
    fn create_rejects_empty_cart() {
        let order = Order::default();
        let result = order.create(
            AggregateId::new(),
            Purchaser::Customer(CustomerId::new()),
            vec![],
            Totals::default(),
        );
        assert!(matches!(result, Err(OrderError::EmptyOrder)));
    }

    #[test]
    fn attach_references_in_draft() {
        let (mut order, _) = draft_order();

        let expiry = Utc::now() + chrono::Duration::minutes(30);
        order.apply_events(order.attach_reservation("rsv-1", expiry).unwrap());
        assert_eq!(order.reservation_ref(), Some("rsv-1"));
        assert_eq!(order.reservation_expires_at(), Some(expiry));

        let payment_id = AggregateId::new();
        order.apply_events(order.attach_payment_intent(payment_id, "pi_123").unwrap());
        assert_eq!(order.payment_id(), Some(payment_id));
        assert_eq!(order.payment_intent_id(), Some("pi_123"));
    }

    #[test]
    fn attach_reservation_outside_draft_fails() {
        let order = confirmed_order();
        let result = order.attach_reservation("rsv-2", Utc::now());
        assert!(matches!(result, Err(OrderError::UnexpectedStatus { .. })));
    }

    #[test]
    fn full_lifecycle() {
        let (mut order, _) = draft_order();

        order.apply_events(order.confirm().unwrap());
        assert_eq!(order.status(), OrderStatus::Confirmed);

        order.apply_events(order.start_fulfillment().unwrap());
        assert_eq!(order.status(), OrderStatus::Processing);

        order.apply_events(order.mark_shipped(Some("TRK-9".to_string())).unwrap());
        assert_eq!(order.status(), OrderStatus::Shipped);

        order.apply_events(order.mark_delivered().unwrap());
        assert_eq!(order.status(), OrderStatus::Delivered);

        order.apply_events(order.mark_refunded("re_1").unwrap());
        assert_eq!(order.status(), OrderStatus::Refunded);
        assert!(order.is_terminal());
    }

    #[test]
    fn draft_cannot_ship() {
        let (order, _) = draft_order();
        let result = order.mark_shipped(None);
        assert!(matches!(
            result,
            Err(OrderError::InvalidTransition {
                from: OrderStatus::Draft,
                to: OrderStatus::Shipped,
            })
        ));
        // No mutation happened: still Draft.
        assert_eq!(order.status(), OrderStatus::Draft);
    }

    #[test]
    fn draft_cannot_be_refunded() {
        let (order, _) = draft_order();
        assert!(matches!(
            order.mark_refunded("re_1"),
            Err(OrderError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn cancel_from_draft_and_confirmed() {
        let (mut order, _) = draft_order();
        order.apply_events(order.cancel("abandoned checkout", None).unwrap());
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert!(order.is_terminal());

        let mut order = confirmed_order();
        order.apply_events(order.cancel("customer request", Some("user".into())).unwrap());
        assert_eq!(order.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn cancelled_order_rejects_everything() {
        let (mut order, _) = draft_order();
        order.apply_events(order.cancel("abandoned", None).unwrap());

        assert!(order.confirm().is_err());
        assert!(order.cancel("again", None).is_err());
        assert!(order.mark_shipped(None).is_err());
    }

    #[test]
    fn payment_retry_increments_counter_and_keeps_draft() {
        let (mut order, _) = draft_order();

        order.apply_events(order.record_payment_retry("insufficient_funds").unwrap());
        order.apply_events(order.record_payment_retry("try_again_later").unwrap());

        assert_eq!(order.status(), OrderStatus::Draft);
        assert_eq!(order.retry_count(), 2);
    }

    #[test]
    fn payment_retry_rejected_after_confirmation() {
        let order = confirmed_order();
        assert!(order.record_payment_retry("late decline").is_err());
    }

    #[test]
    fn reservation_expiry_check() {
        let (mut order, _) = draft_order();
        let past = Utc::now() - chrono::Duration::minutes(5);
        order.apply_events(order.attach_reservation("rsv-1", past).unwrap());

        assert!(order.reservation_expired(Utc::now()));

        // Confirmed orders are never swept.
        order.apply_events(order.confirm().unwrap());
        assert!(!order.reservation_expired(Utc::now()));
    }

    #[test]
    fn admin_note() {
        let (mut order, _) = draft_order();
        order.apply_events(order.set_admin_note("called customer, will retry").unwrap());
        assert_eq!(order.admin_note(), Some("called customer, will retry"));
    }

    #[test]
    fn serialization_roundtrip() {
        let (order, order_id) = draft_order();
        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id(), Some(order_id));
        assert_eq!(back.items().len(), 2);
        assert_eq!(back.totals(), order.totals());
    }
}
