//! Payment commands.

use common::{AggregateId, Currency, Money};

/// Command to record a new gateway intent.
#[derive(Debug, Clone)]
pub struct InitiatePayment {
    pub payment_id: AggregateId,
    pub order_id: AggregateId,
    pub amount: Money,
    pub currency: Currency,
    pub intent_id: String,
}

impl InitiatePayment {
    /// Creates the command with a generated payment ID.
    pub fn new(
        order_id: AggregateId,
        amount: Money,
        currency: Currency,
        intent_id: impl Into<String>,
    ) -> Self {
        Self {
            payment_id: AggregateId::new(),
            order_id,
            amount,
            currency,
            intent_id: intent_id.into(),
        }
    }
}

/// Command to mark a payment captured.
#[derive(Debug, Clone)]
pub struct CompletePayment {
    pub payment_id: AggregateId,
    pub charge_id: String,
}

impl CompletePayment {
    pub fn new(payment_id: AggregateId, charge_id: impl Into<String>) -> Self {
        Self {
            payment_id,
            charge_id: charge_id.into(),
        }
    }
}

/// Command to mark a payment failed.
#[derive(Debug, Clone)]
pub struct FailPayment {
    pub payment_id: AggregateId,
    pub reason: String,
    pub retryable: bool,
}

impl FailPayment {
    pub fn new(payment_id: AggregateId, reason: impl Into<String>, retryable: bool) -> Self {
        Self {
            payment_id,
            reason: reason.into(),
            retryable,
        }
    }
}

/// Command to record a gateway-accepted refund.
#[derive(Debug, Clone)]
pub struct RequestRefund {
    pub payment_id: AggregateId,
    pub refund_id: String,
    pub amount: Money,
}

impl RequestRefund {
    pub fn new(payment_id: AggregateId, refund_id: impl Into<String>, amount: Money) -> Self {
        Self {
            payment_id,
            refund_id: refund_id.into(),
            amount,
        }
    }
}
