//! Payment domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, Currency, Money};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

/// Events that can occur on a payment aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PaymentEvent {
    /// An intent was opened at the gateway.
    PaymentInitiated(PaymentInitiatedData),

    /// The gateway confirmed capture.
    PaymentCompleted(PaymentCompletedData),

    /// The gateway reported a failure.
    PaymentFailed(PaymentFailedData),

    /// A refund was accepted by the gateway.
    RefundRequested(RefundRequestedData),
}

impl DomainEvent for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::PaymentInitiated(_) => "PaymentInitiated",
            PaymentEvent::PaymentCompleted(_) => "PaymentCompleted",
            PaymentEvent::PaymentFailed(_) => "PaymentFailed",
            PaymentEvent::RefundRequested(_) => "RefundRequested",
        }
    }
}

/// Data for PaymentInitiated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInitiatedData {
    pub payment_id: AggregateId,
    pub order_id: AggregateId,
    pub amount: Money,
    pub currency: Currency,
    pub intent_id: String,
    pub initiated_at: DateTime<Utc>,
}

/// Data for PaymentCompleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCompletedData {
    pub charge_id: String,
    pub completed_at: DateTime<Utc>,
}

/// Data for PaymentFailed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailedData {
    pub reason: String,
    /// Whether the decline is worth retrying (temporary decline) or
    /// terminal (e.g. fraud signal).
    pub retryable: bool,
    pub failed_at: DateTime<Utc>,
}

/// Data for RefundRequested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequestedData {
    pub refund_id: String,
    pub amount: Money,
    pub requested_at: DateTime<Utc>,
}

impl PaymentEvent {
    pub fn initiated(
        payment_id: AggregateId,
        order_id: AggregateId,
        amount: Money,
        currency: Currency,
        intent_id: impl Into<String>,
    ) -> Self {
        PaymentEvent::PaymentInitiated(PaymentInitiatedData {
            payment_id,
            order_id,
            amount,
            currency,
            intent_id: intent_id.into(),
            initiated_at: Utc::now(),
        })
    }

    pub fn completed(charge_id: impl Into<String>) -> Self {
        PaymentEvent::PaymentCompleted(PaymentCompletedData {
            charge_id: charge_id.into(),
            completed_at: Utc::now(),
        })
    }

    pub fn failed(reason: impl Into<String>, retryable: bool) -> Self {
        PaymentEvent::PaymentFailed(PaymentFailedData {
            reason: reason.into(),
            retryable,
            failed_at: Utc::now(),
        })
    }

    pub fn refund_requested(refund_id: impl Into<String>, amount: Money) -> Self {
        PaymentEvent::RefundRequested(RefundRequestedData {
            refund_id: refund_id.into(),
            amount,
            requested_at: Utc::now(),
        })
    }
}
