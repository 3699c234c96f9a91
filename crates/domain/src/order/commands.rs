//! Order commands.

use chrono::{DateTime, Utc};
use common::AggregateId;

use super::{OrderItem, Purchaser, Totals};

/// Command to create a new order from a validated cart.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub order_id: AggregateId,
    pub purchaser: Purchaser,
    pub items: Vec<OrderItem>,
    pub totals: Totals,
}

impl CreateOrder {
    /// Creates the command with a generated order ID.
    pub fn new(purchaser: Purchaser, items: Vec<OrderItem>, totals: Totals) -> Self {
        Self {
            order_id: AggregateId::new(),
            purchaser,
            items,
            totals,
        }
    }
}

/// Command to record the inventory reservation on an order.
#[derive(Debug, Clone)]
pub struct AttachReservation {
    pub order_id: AggregateId,
    pub reservation_ref: String,
    pub expires_at: DateTime<Utc>,
}

impl AttachReservation {
    pub fn new(
        order_id: AggregateId,
        reservation_ref: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id,
            reservation_ref: reservation_ref.into(),
            expires_at,
        }
    }
}

/// Command to record the payment intent on an order.
#[derive(Debug, Clone)]
pub struct AttachPaymentIntent {
    pub order_id: AggregateId,
    pub payment_id: AggregateId,
    pub intent_id: String,
}

impl AttachPaymentIntent {
    pub fn new(order_id: AggregateId, payment_id: AggregateId, intent_id: impl Into<String>) -> Self {
        Self {
            order_id,
            payment_id,
            intent_id: intent_id.into(),
        }
    }
}

/// Command to confirm an order after payment capture.
#[derive(Debug, Clone)]
pub struct ConfirmOrder {
    pub order_id: AggregateId,
}

impl ConfirmOrder {
    pub fn new(order_id: AggregateId) -> Self {
        Self { order_id }
    }
}

/// Command to record a retryable payment decline.
#[derive(Debug, Clone)]
pub struct RecordPaymentRetry {
    pub order_id: AggregateId,
    pub reason: String,
}

impl RecordPaymentRetry {
    pub fn new(order_id: AggregateId, reason: impl Into<String>) -> Self {
        Self {
            order_id,
            reason: reason.into(),
        }
    }
}

/// Command to start fulfillment.
#[derive(Debug, Clone)]
pub struct StartFulfillment {
    pub order_id: AggregateId,
}

impl StartFulfillment {
    pub fn new(order_id: AggregateId) -> Self {
        Self { order_id }
    }
}

/// Command to mark an order shipped.
#[derive(Debug, Clone)]
pub struct MarkShipped {
    pub order_id: AggregateId,
    pub tracking_number: Option<String>,
}

impl MarkShipped {
    pub fn new(order_id: AggregateId, tracking_number: Option<String>) -> Self {
        Self {
            order_id,
            tracking_number,
        }
    }
}

/// Command to mark an order delivered.
#[derive(Debug, Clone)]
pub struct MarkDelivered {
    pub order_id: AggregateId,
}

impl MarkDelivered {
    pub fn new(order_id: AggregateId) -> Self {
        Self { order_id }
    }
}

/// Command to cancel an order.
#[derive(Debug, Clone)]
pub struct CancelOrder {
    pub order_id: AggregateId,
    pub reason: String,
    pub cancelled_by: Option<String>,
}

impl CancelOrder {
    pub fn new(
        order_id: AggregateId,
        reason: impl Into<String>,
        cancelled_by: Option<String>,
    ) -> Self {
        Self {
            order_id,
            reason: reason.into(),
            cancelled_by,
        }
    }
}

/// Command to mark an order fully refunded.
#[derive(Debug, Clone)]
pub struct MarkRefunded {
    pub order_id: AggregateId,
    pub refund_ref: String,
}

impl MarkRefunded {
    pub fn new(order_id: AggregateId, refund_ref: impl Into<String>) -> Self {
        Self {
            order_id,
            refund_ref: refund_ref.into(),
        }
    }
}

/// Command to set the admin note on an order.
#[derive(Debug, Clone)]
pub struct SetAdminNote {
    pub order_id: AggregateId,
    pub note: String,
}

impl SetAdminNote {
    pub fn new(order_id: AggregateId, note: impl Into<String>) -> Self {
        Self {
            order_id,
            note: note.into(),
        }
    }
}
