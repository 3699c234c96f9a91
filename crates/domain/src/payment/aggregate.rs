//! Payment aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, Currency, Money};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

use super::{PaymentError, PaymentEvent, PaymentStatus, RefundStatus};

/// A refund held against a completed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRecord {
    /// Gateway refund identifier.
    pub refund_id: String,
    pub amount: Money,
    pub status: RefundStatus,
    pub requested_at: DateTime<Utc>,
}

/// Payment aggregate root.
///
/// Local mirror of what the gateway knows about one order's payment:
/// intent, capture, failure, and any refunds. The refundable balance
/// (captured minus already refunded) is the guard for admin refunds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Payment {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    order_id: Option<AggregateId>,
    amount: Money,
    currency: Currency,
    status: PaymentStatus,
    intent_id: Option<String>,
    charge_id: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
    last_failure_retryable: Option<bool>,
    refunds: Vec<RefundRecord>,
}

impl Aggregate for Payment {
    type Event = PaymentEvent;
    type Error = PaymentError;

    fn aggregate_type() -> &'static str {
        "Payment"
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
            PaymentEvent::PaymentInitiated(data) => {
                self.id = Some(data.payment_id);
                self.order_id = Some(data.order_id);
                self.amount = data.amount;
                self.currency = data.currency;
                self.intent_id = Some(data.intent_id);
                self.status = PaymentStatus::Pending;
            }
            PaymentEvent::PaymentCompleted(data) => {
                self.charge_id = Some(data.charge_id);
                self.completed_at = Some(data.completed_at);
                self.status = PaymentStatus::Completed;
            }
            PaymentEvent::PaymentFailed(data) => {
                self.failure_reason = Some(data.reason);
                self.last_failure_retryable = Some(data.retryable);
                self.status = PaymentStatus::Failed;
            }
            PaymentEvent::RefundRequested(data) => {
                self.refunds.push(RefundRecord {
                    refund_id: data.refund_id,
                    amount: data.amount,
                    status: RefundStatus::Processing,
                    requested_at: data.requested_at,
                });
            }
        }
    }
}

// Query methods
impl Payment {
    pub fn order_id(&self) -> Option<AggregateId> {
        self.order_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn intent_id(&self) -> Option<&str> {
        self.intent_id.as_deref()
    }

    pub fn charge_id(&self) -> Option<&str> {
        self.charge_id.as_deref()
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn last_failure_retryable(&self) -> Option<bool> {
        self.last_failure_retryable
    }

    pub fn refunds(&self) -> &[RefundRecord] {
        &self.refunds
    }

    /// Total amount refunded so far.
    pub fn refunded_amount(&self) -> Money {
        self.refunds.iter().map(|r| r.amount).sum()
    }

    /// Captured amount not yet refunded.
    pub fn refundable_balance(&self) -> Money {
        self.amount - self.refunded_amount()
    }

    /// True once cumulative refunds reach the captured amount.
    pub fn is_fully_refunded(&self) -> bool {
        self.status == PaymentStatus::Completed && self.refundable_balance().is_zero()
    }
}

// Command methods
impl Payment {
    /// Records a new gateway intent.
    pub fn initiate(
        &self,
        payment_id: AggregateId,
        order_id: AggregateId,
        amount: Money,
        currency: Currency,
        intent_id: impl Into<String>,
    ) -> Result<Vec<PaymentEvent>, PaymentError> {
        if self.id.is_some() {
            return Err(PaymentError::AlreadyInitiated);
        }
        if !amount.is_positive() {
            return Err(PaymentError::InvalidAmount {
                amount: amount.cents(),
            });
        }

        Ok(vec![PaymentEvent::initiated(
            payment_id, order_id, amount, currency, intent_id,
        )])
    }

    /// Marks the payment captured. Pending only — a duplicate completion
    /// surfaces as `NotPending` and is treated as a replay by the caller.
    pub fn complete(&self, charge_id: impl Into<String>) -> Result<Vec<PaymentEvent>, PaymentError> {
        self.require_pending()?;
        Ok(vec![PaymentEvent::completed(charge_id)])
    }

    /// Marks the payment failed with the gateway's reason.
    pub fn fail(
        &self,
        reason: impl Into<String>,
        retryable: bool,
    ) -> Result<Vec<PaymentEvent>, PaymentError> {
        self.require_pending()?;
        Ok(vec![PaymentEvent::failed(reason, retryable)])
    }

    /// Records a gateway-accepted refund.
    ///
    /// Requires a completed payment and `amount <= refundable_balance`.
    pub fn request_refund(
        &self,
        refund_id: impl Into<String>,
        amount: Money,
    ) -> Result<Vec<PaymentEvent>, PaymentError> {
        if self.id.is_none() {
            return Err(PaymentError::NotCreated);
        }
        if self.status != PaymentStatus::Completed {
            return Err(PaymentError::NotCompleted {
                actual: self.status,
            });
        }
        if !amount.is_positive() {
            return Err(PaymentError::InvalidAmount {
                amount: amount.cents(),
            });
        }
        let refundable = self.refundable_balance();
        if amount > refundable {
            return Err(PaymentError::RefundExceedsCaptured {
                requested: amount.cents(),
                refundable: refundable.cents(),
            });
        }

        Ok(vec![PaymentEvent::refund_requested(refund_id, amount)])
    }

    fn require_pending(&self) -> Result<(), PaymentError> {
        if self.id.is_none() {
            return Err(PaymentError::NotCreated);
        }
        if self.status == PaymentStatus::Pending {
            Ok(())
        } else {
            Err(PaymentError::NotPending {
                actual: self.status,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregate;

    fn pending_payment() -> Payment {
        let mut payment = Payment::default();
        let events = payment
            .initiate(
                AggregateId::new(),
                AggregateId::new(),
                Money::from_cents(10_000),
                Currency::Eur,
                "pi_1",
            )
            .unwrap();
        payment.apply_events(events);
        payment
    }

    fn completed_payment() -> Payment {
        let mut payment = pending_payment();
        payment.apply_events(payment.complete("ch_1").unwrap());
        payment
    }

    #[test]
    fn initiate_sets_pending() {
        let payment = pending_payment();
        assert_eq!(payment.status(), PaymentStatus::Pending);
        assert_eq!(payment.intent_id(), Some("pi_1"));
        assert_eq!(payment.amount().cents(), 10_000);
    }

    #[test]
    fn initiate_twice_fails() {
        let payment = pending_payment();
        let result = payment.initiate(
            AggregateId::new(),
            AggregateId::new(),
            Money::from_cents(1),
            Currency::Eur,
            "pi_2",
        );
        assert!(matches!(result, Err(PaymentError::AlreadyInitiated)));
    }

    #[test]
    fn initiate_rejects_non_positive_amount() {
        let payment = Payment::default();
        let result = payment.initiate(
            AggregateId::new(),
            AggregateId::new(),
            Money::zero(),
            Currency::Eur,
            "pi_1",
        );
        assert!(matches!(result, Err(PaymentError::InvalidAmount { .. })));
    }

    #[test]
    fn complete_records_charge() {
        let payment = completed_payment();
        assert_eq!(payment.status(), PaymentStatus::Completed);
        assert_eq!(payment.charge_id(), Some("ch_1"));
        assert!(payment.completed_at().is_some());
    }

    #[test]
    fn complete_twice_fails() {
        let payment = completed_payment();
        assert!(matches!(
            payment.complete("ch_2"),
            Err(PaymentError::NotPending { .. })
        ));
    }

    #[test]
    fn fail_records_reason_and_retryability() {
        let mut payment = pending_payment();
        payment.apply_events(payment.fail("insufficient_funds", true).unwrap());

        assert_eq!(payment.status(), PaymentStatus::Failed);
        assert_eq!(payment.failure_reason(), Some("insufficient_funds"));
        assert_eq!(payment.last_failure_retryable(), Some(true));
    }

    #[test]
    fn refund_within_captured_amount() {
        let mut payment = completed_payment();
        payment.apply_events(
            payment
                .request_refund("re_1", Money::from_cents(4_000))
                .unwrap(),
        );

        assert_eq!(payment.refunded_amount().cents(), 4_000);
        assert_eq!(payment.refundable_balance().cents(), 6_000);
        assert!(!payment.is_fully_refunded());
        assert_eq!(payment.refunds()[0].status, RefundStatus::Processing);
    }

    #[test]
    fn refund_exceeding_captured_rejected() {
        // Captured 100.00, refund request 150.00.
        let mut payment = Payment::default();
        payment.apply_events(
            payment
                .initiate(
                    AggregateId::new(),
                    AggregateId::new(),
                    Money::from_cents(10_000),
                    Currency::Eur,
                    "pi_1",
                )
                .unwrap(),
        );
        payment.apply_events(payment.complete("ch_1").unwrap());

        let result = payment.request_refund("re_1", Money::from_cents(15_000));
        assert!(matches!(
            result,
            Err(PaymentError::RefundExceedsCaptured {
                requested: 15_000,
                refundable: 10_000,
            })
        ));
        // Nothing recorded.
        assert!(payment.refunds().is_empty());
    }

    #[test]
    fn partial_refunds_accumulate_to_full() {
        let mut payment = completed_payment();
        payment.apply_events(
            payment
                .request_refund("re_1", Money::from_cents(6_000))
                .unwrap(),
        );
        payment.apply_events(
            payment
                .request_refund("re_2", Money::from_cents(4_000))
                .unwrap(),
        );

        assert!(payment.is_fully_refunded());
        assert!(matches!(
            payment.request_refund("re_3", Money::from_cents(1)),
            Err(PaymentError::RefundExceedsCaptured { .. })
        ));
    }

    #[test]
    fn refund_requires_completed_payment() {
        let payment = pending_payment();
        assert!(matches!(
            payment.request_refund("re_1", Money::from_cents(1)),
            Err(PaymentError::NotCompleted { .. })
        ));
    }
}
