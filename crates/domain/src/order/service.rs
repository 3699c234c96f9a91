//! Order service: the command-side API over the order aggregate.

use common::AggregateId;
use event_store::EventStore;

use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;

use super::{
    AttachPaymentIntent, AttachReservation, CancelOrder, ConfirmOrder, CreateOrder, MarkDelivered,
    MarkRefunded, MarkShipped, Order, RecordPaymentRetry, SetAdminNote, StartFulfillment,
};

impl From<super::OrderError> for DomainError {
    fn from(e: super::OrderError) -> Self {
        DomainError::Order(e)
    }
}

/// Service for managing orders.
///
/// Wraps the command handler; every method is one unit of work against the
/// order's event stream.
pub struct OrderService<S: EventStore> {
    handler: CommandHandler<S, Order>,
}

impl<S: EventStore> OrderService<S> {
    /// Creates a new order service with the given event store.
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    /// Creates a new order in Draft from a validated cart.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn create_order(
        &self,
        cmd: CreateOrder,
    ) -> Result<CommandResult<Order>, DomainError> {
        metrics::counter!("orders_created_total").increment(1);
        let CreateOrder {
            order_id,
            purchaser,
            items,
            totals,
        } = cmd;

        self.handler
            .execute(order_id, |order| {
                order.create(order_id, purchaser, items, totals)
            })
            .await
    }

    /// Records the inventory reservation reference.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn attach_reservation(
        &self,
        cmd: AttachReservation,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute(cmd.order_id, |order| {
                order.attach_reservation(cmd.reservation_ref.clone(), cmd.expires_at)
            })
            .await
    }

    /// Records the payment intent reference.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn attach_payment_intent(
        &self,
        cmd: AttachPaymentIntent,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute(cmd.order_id, |order| {
                order.attach_payment_intent(cmd.payment_id, cmd.intent_id.clone())
            })
            .await
    }

    /// Confirms the order. Draft → Confirmed.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn confirm_order(
        &self,
        cmd: ConfirmOrder,
    ) -> Result<CommandResult<Order>, DomainError> {
        metrics::counter!("orders_confirmed_total").increment(1);
        self.handler
            .execute(cmd.order_id, |order| order.confirm())
            .await
    }

    /// Records a retryable payment decline; order stays Draft.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn record_payment_retry(
        &self,
        cmd: RecordPaymentRetry,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute(cmd.order_id, |order| {
                order.record_payment_retry(cmd.reason.clone())
            })
            .await
    }

    /// Starts fulfillment. Confirmed → Processing.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn start_fulfillment(
        &self,
        cmd: StartFulfillment,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute(cmd.order_id, |order| order.start_fulfillment())
            .await
    }

    /// Marks shipped. Processing → Shipped.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn mark_shipped(
        &self,
        cmd: MarkShipped,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute(cmd.order_id, |order| {
                order.mark_shipped(cmd.tracking_number.clone())
            })
            .await
    }

    /// Marks delivered. Shipped → Delivered.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn mark_delivered(
        &self,
        cmd: MarkDelivered,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute(cmd.order_id, |order| order.mark_delivered())
            .await
    }

    /// Cancels the order.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn cancel_order(
        &self,
        cmd: CancelOrder,
    ) -> Result<CommandResult<Order>, DomainError> {
        metrics::counter!("orders_cancelled_total").increment(1);
        self.handler
            .execute(cmd.order_id, |order| {
                order.cancel(cmd.reason.clone(), cmd.cancelled_by.clone())
            })
            .await
    }

    /// Marks the order fully refunded.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn mark_refunded(
        &self,
        cmd: MarkRefunded,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute(cmd.order_id, |order| {
                order.mark_refunded(cmd.refund_ref.clone())
            })
            .await
    }

    /// Sets the admin note.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn set_admin_note(
        &self,
        cmd: SetAdminNote,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute(cmd.order_id, |order| order.set_admin_note(cmd.note.clone()))
            .await
    }

    /// Loads an order by ID, or None if it doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: AggregateId) -> Result<Option<Order>, DomainError> {
        self.handler.load_existing(order_id).await
    }
}
