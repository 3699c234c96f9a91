//! Payment service: command-side API over the payment aggregate.

use common::AggregateId;
use event_store::EventStore;

use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;

use super::{CompletePayment, FailPayment, InitiatePayment, Payment, RequestRefund};

impl From<super::PaymentError> for DomainError {
    fn from(e: super::PaymentError) -> Self {
        DomainError::Payment(e)
    }
}

/// Service for managing payment records.
pub struct PaymentService<S: EventStore> {
    handler: CommandHandler<S, Payment>,
}

impl<S: EventStore> PaymentService<S> {
    /// Creates a new payment service with the given event store.
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    /// Records a new gateway intent in Pending.
    #[tracing::instrument(skip(self, cmd), fields(payment_id = %cmd.payment_id, order_id = %cmd.order_id))]
    pub async fn initiate(
        &self,
        cmd: InitiatePayment,
    ) -> Result<CommandResult<Payment>, DomainError> {
        let InitiatePayment {
            payment_id,
            order_id,
            amount,
            currency,
            intent_id,
        } = cmd;

        self.handler
            .execute(payment_id, |payment| {
                payment.initiate(payment_id, order_id, amount, currency, intent_id)
            })
            .await
    }

    /// Marks a payment captured.
    #[tracing::instrument(skip(self, cmd), fields(payment_id = %cmd.payment_id))]
    pub async fn complete(
        &self,
        cmd: CompletePayment,
    ) -> Result<CommandResult<Payment>, DomainError> {
        metrics::counter!("payments_completed_total").increment(1);
        self.handler
            .execute(cmd.payment_id, |payment| {
                payment.complete(cmd.charge_id.clone())
            })
            .await
    }

    /// Marks a payment failed.
    #[tracing::instrument(skip(self, cmd), fields(payment_id = %cmd.payment_id))]
    pub async fn fail(&self, cmd: FailPayment) -> Result<CommandResult<Payment>, DomainError> {
        metrics::counter!("payments_failed_total").increment(1);
        self.handler
            .execute(cmd.payment_id, |payment| {
                payment.fail(cmd.reason.clone(), cmd.retryable)
            })
            .await
    }

    /// Records a gateway-accepted refund.
    #[tracing::instrument(skip(self, cmd), fields(payment_id = %cmd.payment_id))]
    pub async fn request_refund(
        &self,
        cmd: RequestRefund,
    ) -> Result<CommandResult<Payment>, DomainError> {
        self.handler
            .execute(cmd.payment_id, |payment| {
                payment.request_refund(cmd.refund_id.clone(), cmd.amount)
            })
            .await
    }

    /// Loads a payment by ID, or None if it doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_payment(
        &self,
        payment_id: AggregateId,
    ) -> Result<Option<Payment>, DomainError> {
        self.handler.load_existing(payment_id).await
    }
}
