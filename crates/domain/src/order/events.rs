//! Order domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{OrderItem, OrderNumber, Purchaser, Totals};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was created from a validated cart. The line-item snapshot in
    /// this event is final; items are never edited afterwards.
    OrderCreated(OrderCreatedData),

    /// Inventory holds were placed for the order.
    ReservationAttached(ReservationAttachedData),

    /// A payment intent was opened at the gateway.
    PaymentIntentAttached(PaymentIntentAttachedData),

    /// Payment confirmed; the order is binding.
    OrderConfirmed(OrderConfirmedData),

    /// A retryable payment decline was recorded; the order stays Draft.
    PaymentRetryRecorded(PaymentRetryRecordedData),

    /// Fulfillment (pick/pack) started.
    FulfillmentStarted(FulfillmentStartedData),

    /// Order was handed to the carrier.
    OrderShipped(OrderShippedData),

    /// Order was delivered.
    OrderDelivered(OrderDeliveredData),

    /// Order was cancelled.
    OrderCancelled(OrderCancelledData),

    /// Order was fully refunded.
    OrderRefunded(OrderRefundedData),

    /// An admin note was set on the order.
    AdminNoteSet(AdminNoteSetData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "OrderCreated",
            OrderEvent::ReservationAttached(_) => "ReservationAttached",
            OrderEvent::PaymentIntentAttached(_) => "PaymentIntentAttached",
            OrderEvent::OrderConfirmed(_) => "OrderConfirmed",
            OrderEvent::PaymentRetryRecorded(_) => "PaymentRetryRecorded",
            OrderEvent::FulfillmentStarted(_) => "FulfillmentStarted",
            OrderEvent::OrderShipped(_) => "OrderShipped",
            OrderEvent::OrderDelivered(_) => "OrderDelivered",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
            OrderEvent::OrderRefunded(_) => "OrderRefunded",
            OrderEvent::AdminNoteSet(_) => "AdminNoteSet",
        }
    }
}

/// Data for OrderCreated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedData {
    pub order_id: AggregateId,
    pub order_number: OrderNumber,
    pub purchaser: Purchaser,
    pub items: Vec<OrderItem>,
    pub totals: Totals,
    pub created_at: DateTime<Utc>,
}

/// Data for ReservationAttached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationAttachedData {
    /// Reference to the reservation held by the inventory coordinator.
    pub reservation_ref: String,
    /// When the holds lapse if the checkout is abandoned.
    pub expires_at: DateTime<Utc>,
    pub attached_at: DateTime<Utc>,
}

/// Data for PaymentIntentAttached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentAttachedData {
    /// The local payment aggregate tracking this intent.
    pub payment_id: AggregateId,
    /// The gateway's intent identifier.
    pub intent_id: String,
    pub attached_at: DateTime<Utc>,
}

/// Data for OrderConfirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfirmedData {
    pub confirmed_at: DateTime<Utc>,
}

/// Data for PaymentRetryRecorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRetryRecordedData {
    /// Gateway reason for the decline.
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

/// Data for FulfillmentStarted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentStartedData {
    pub started_at: DateTime<Utc>,
}

/// Data for OrderShipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderShippedData {
    pub tracking_number: Option<String>,
    pub shipped_at: DateTime<Utc>,
}

/// Data for OrderDelivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDeliveredData {
    pub delivered_at: DateTime<Utc>,
}

/// Data for OrderCancelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub reason: String,
    pub cancelled_by: Option<String>,
    pub cancelled_at: DateTime<Utc>,
}

/// Data for OrderRefunded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRefundedData {
    /// The gateway refund that completed the full refund.
    pub refund_ref: String,
    pub refunded_at: DateTime<Utc>,
}

/// Data for AdminNoteSet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminNoteSetData {
    pub note: String,
    pub set_at: DateTime<Utc>,
}

// Convenience constructors
impl OrderEvent {
    pub fn order_created(
        order_id: AggregateId,
        purchaser: Purchaser,
        items: Vec<OrderItem>,
        totals: Totals,
    ) -> Self {
        OrderEvent::OrderCreated(OrderCreatedData {
            order_id,
            order_number: OrderNumber::derive(order_id),
            purchaser,
            items,
            totals,
            created_at: Utc::now(),
        })
    }

    pub fn reservation_attached(
        reservation_ref: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        OrderEvent::ReservationAttached(ReservationAttachedData {
            reservation_ref: reservation_ref.into(),
            expires_at,
            attached_at: Utc::now(),
        })
    }

    pub fn payment_intent_attached(payment_id: AggregateId, intent_id: impl Into<String>) -> Self {
        OrderEvent::PaymentIntentAttached(PaymentIntentAttachedData {
            payment_id,
            intent_id: intent_id.into(),
            attached_at: Utc::now(),
        })
    }

    pub fn order_confirmed() -> Self {
        OrderEvent::OrderConfirmed(OrderConfirmedData {
            confirmed_at: Utc::now(),
        })
    }

    pub fn payment_retry_recorded(reason: impl Into<String>) -> Self {
        OrderEvent::PaymentRetryRecorded(PaymentRetryRecordedData {
            reason: reason.into(),
            recorded_at: Utc::now(),
        })
    }

    pub fn fulfillment_started() -> Self {
        OrderEvent::FulfillmentStarted(FulfillmentStartedData {
            started_at: Utc::now(),
        })
    }

    pub fn order_shipped(tracking_number: Option<String>) -> Self {
        OrderEvent::OrderShipped(OrderShippedData {
            tracking_number,
            shipped_at: Utc::now(),
        })
    }

    pub fn order_delivered() -> Self {
        OrderEvent::OrderDelivered(OrderDeliveredData {
            delivered_at: Utc::now(),
        })
    }

    pub fn order_cancelled(reason: impl Into<String>, cancelled_by: Option<String>) -> Self {
        OrderEvent::OrderCancelled(OrderCancelledData {
            reason: reason.into(),
            cancelled_by,
            cancelled_at: Utc::now(),
        })
    }

    pub fn order_refunded(refund_ref: impl Into<String>) -> Self {
        OrderEvent::OrderRefunded(OrderRefundedData {
            refund_ref: refund_ref.into(),
            refunded_at: Utc::now(),
        })
    }

    pub fn admin_note_set(note: impl Into<String>) -> Self {
        OrderEvent::AdminNoteSet(AdminNoteSetData {
            note: note.into(),
            set_at: Utc::now(),
        })
    }
}
