//! Checkout orchestrator.
//!
//! Drives an order from validated cart to terminal state across the stock
//! service and the payment gateway, compensating on partial failure.
//!
//! The checkout sequence reserves inventory before creating the payment
//! intent: releasing an unconfirmed hold is cheap and invisible, while
//! reversing a captured payment costs fees and customer trust. Checkout
//! completion always arrives later through the signed webhook path.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{AggregateId, Money};
use domain::{
    AttachPaymentIntent, AttachReservation, CancelOrder, ConfirmOrder, CreateOrder, MarkDelivered,
    MarkRefunded, MarkShipped, Order, OrderItem, OrderStatus, Purchaser, RecordPaymentRetry,
    StartFulfillment, OrderService, Totals, calculate_totals,
};
use event_store::EventStore;

use crate::bus::{EventBus, IntegrationEvent};
use crate::config::CheckoutConfig;
use crate::error::{Result, SagaError};
use crate::payments::{PaymentCoordinator, PaymentIntent, RefundOutcome};
use crate::reservation::ReservationCoordinator;
use crate::retry::RetryPolicy;
use crate::services::{InvoiceGenerator, NotificationSender, PaymentGateway, StockService};
use crate::webhook::{ProcessedEventStore, WebhookEvent, WebhookEventKind, WebhookVerifier};

/// A checkout request built from a validated cart.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub purchaser: Purchaser,
    pub items: Vec<OrderItem>,
    pub discount: Money,
}

/// Successful checkout: the order is in Draft with inventory held and an
/// open payment intent for the client to complete.
#[derive(Debug, Clone)]
pub struct CheckoutAccepted {
    pub order_id: AggregateId,
    pub order_number: String,
    pub totals: Totals,
    pub intent: PaymentIntent,
}

/// What handling a webhook delivery did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// First delivery: state was mutated.
    Processed,
    /// The event id was already processed; nothing changed.
    Replayed,
}

/// Orchestrates checkout, webhook completion, cancellation, refunds, and
/// the abandoned-checkout sweep.
///
/// Every collaborator is passed in through the constructor; tests
/// substitute in-memory doubles without any framework context.
pub struct CheckoutOrchestrator<S, St, G>
where
    S: EventStore + Clone,
    St: StockService,
    G: PaymentGateway,
{
    orders: OrderService<S>,
    payments: PaymentCoordinator<S, G>,
    reservations: ReservationCoordinator<St>,
    invoices: Arc<dyn InvoiceGenerator>,
    notifier: Arc<dyn NotificationSender>,
    bus: Arc<dyn EventBus>,
    verifier: WebhookVerifier,
    processed: Arc<dyn ProcessedEventStore>,
    config: CheckoutConfig,
}

impl<S, St, G> CheckoutOrchestrator<S, St, G>
where
    S: EventStore + Clone,
    St: StockService,
    G: PaymentGateway,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: S,
        stock: St,
        gateway: G,
        invoices: Arc<dyn InvoiceGenerator>,
        notifier: Arc<dyn NotificationSender>,
        bus: Arc<dyn EventBus>,
        verifier: WebhookVerifier,
        processed: Arc<dyn ProcessedEventStore>,
        config: CheckoutConfig,
    ) -> Self {
        let retry = RetryPolicy::default();
        Self {
            orders: OrderService::new(store.clone()),
            payments: PaymentCoordinator::new(store, gateway, retry.clone()),
            reservations: ReservationCoordinator::new(stock, retry),
            invoices,
            notifier,
            bus,
            verifier,
            processed,
            config,
        }
    }

    /// Runs the checkout saga: totals → Draft order → inventory holds →
    /// payment intent.
    ///
    /// Reservation failure cancels the order without ever touching the
    /// gateway; intent failure releases the holds and cancels. Both
    /// compensations are cheap by design.
    #[tracing::instrument(skip(self, request), fields(item_count = request.items.len()))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutAccepted> {
        metrics::counter!("checkouts_started_total").increment(1);

        // 1. Pure money math; rejects malformed carts before any side
        //    effect.
        let totals = calculate_totals(
            &request.items,
            self.config.tax_rate_bps,
            &self.config.shipping,
            request.discount,
        )
        .map_err(|e| SagaError::Domain(domain::DomainError::Order(e)))?;

        // 2. Order in Draft.
        let cmd = CreateOrder::new(request.purchaser, request.items.clone(), totals);
        let order_id = cmd.order_id;
        let created = self.orders.create_order(cmd).await?;
        let order_number = created
            .aggregate
            .order_number()
            .map(|n| n.to_string())
            .unwrap_or_default();

        self.publish(IntegrationEvent::OrderCreated {
            order_id,
            order_number: order_number.clone(),
            total_cents: totals.total.cents(),
        })
        .await;

        // 3. Reserve inventory. On failure: cancel and stop — the payment
        //    step is never attempted.
        let grant = match self
            .reservations
            .reserve(order_id, &request.items, self.config.reservation_ttl)
            .await
        {
            Ok(grant) => grant,
            Err(err) => {
                self.cancel_failed_checkout(order_id, format!("reservation failed: {err}"))
                    .await;
                metrics::counter!("checkouts_failed_total", "step" => "reserve").increment(1);
                return Err(err);
            }
        };

        let order = self
            .orders
            .attach_reservation(AttachReservation::new(
                order_id,
                grant.reference.clone(),
                grant.expires_at,
            ))
            .await?
            .aggregate;

        // 4. Payment intent. On failure: release the holds, then cancel.
        let intent = match self
            .payments
            .create_intent(&order, self.config.currency, self.config.intent_ttl)
            .await
        {
            Ok(intent) => intent,
            Err(err) => {
                if let Err(release_err) = self.reservations.release(order_id).await {
                    tracing::error!(%order_id, error = %release_err, "failed to release holds during compensation");
                }
                self.cancel_failed_checkout(order_id, format!("payment intent failed: {err}"))
                    .await;
                metrics::counter!("checkouts_failed_total", "step" => "intent").increment(1);
                return Err(err);
            }
        };

        self.orders
            .attach_payment_intent(AttachPaymentIntent::new(
                order_id,
                intent.payment_id,
                intent.intent_id.clone(),
            ))
            .await?;

        metrics::counter!("checkouts_accepted_total").increment(1);
        tracing::info!(%order_id, %order_number, total = %totals.total, "checkout accepted");

        // 5. The intent goes back to the caller; confirmation arrives via
        //    webhook.
        Ok(CheckoutAccepted {
            order_id,
            order_number,
            totals,
            intent,
        })
    }

    /// Handles a gateway webhook delivery.
    ///
    /// Signature verification comes first: a payload that fails it is
    /// rejected with a security error before anything — parsing included —
    /// happens. Replay protection is keyed on the gateway event id.
    #[tracing::instrument(skip(self, payload, signature))]
    pub async fn handle_payment_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookOutcome> {
        if let Err(err) = self.verifier.verify(payload, signature) {
            metrics::counter!("webhook_rejected_total").increment(1);
            tracing::warn!("webhook rejected: invalid signature");
            return Err(err);
        }

        let event = WebhookEvent::parse(payload)?;

        if self.processed.is_processed(&event.event_id).await? {
            metrics::counter!("webhook_replayed_total").increment(1);
            tracing::info!(event_id = %event.event_id, "webhook replay, ignoring");
            return Ok(WebhookOutcome::Replayed);
        }

        let outcome = match &event.kind {
            WebhookEventKind::PaymentSucceeded { charge_id } => {
                self.apply_payment_success(&event, charge_id).await?
            }
            WebhookEventKind::PaymentFailed { reason, retryable } => {
                self.apply_payment_failure(&event, reason, *retryable)
                    .await?
            }
        };

        self.processed.mark_processed(&event.event_id).await?;
        metrics::counter!("webhook_processed_total").increment(1);
        Ok(outcome)
    }

    /// User-initiated cancellation.
    ///
    /// Validated by the state machine and the version check; racing
    /// against an in-flight confirmation, whichever commits first wins and
    /// the loser surfaces a conflict.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: AggregateId,
        cancelled_by: Option<String>,
    ) -> Result<()> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or(SagaError::OrderNotFound(order_id))?;

        self.orders
            .cancel_order(CancelOrder::new(
                order_id,
                "cancelled by customer",
                cancelled_by,
            ))
            .await?;

        // Compensations run only after the transition committed.
        self.reservations.release(order_id).await?;
        self.publish(IntegrationEvent::OrderCancelled {
            order_id,
            reason: "cancelled by customer".to_string(),
        })
        .await;
        self.notify(&order, "order_cancelled").await;

        Ok(())
    }

    /// Admin-initiated refund against the order's captured payment.
    ///
    /// A full refund also moves the order to Refunded where the state
    /// machine allows it; for orders not yet shipped the payment ledger
    /// carries the refund and the status is left to the cancel flow.
    #[tracing::instrument(skip(self))]
    pub async fn admin_refund(&self, order_id: AggregateId, amount: Money) -> Result<RefundOutcome> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or(SagaError::OrderNotFound(order_id))?;
        let payment_id = order
            .payment_id()
            .ok_or(SagaError::PaymentNotFound(order_id))?;

        let outcome = self
            .payments
            .process_refund(order_id, payment_id, amount)
            .await?;

        if outcome.fully_refunded
            && order.status().can_transition_to(OrderStatus::Refunded)
        {
            self.orders
                .mark_refunded(MarkRefunded::new(order_id, outcome.refund_id.clone()))
                .await?;
        }

        self.notify(&order, "refund_processing").await;
        Ok(outcome)
    }

    /// Compensating sweep for abandoned checkouts: Draft orders whose
    /// reservation expired are released and cancelled.
    ///
    /// Returns how many orders were swept. An order that got confirmed
    /// between the scan and the cancel simply loses the race and is
    /// skipped.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_expired_checkouts(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut swept = 0;

        for order_id in self.reservations.expired_orders(now) {
            let Some(order) = self.orders.get_order(order_id).await? else {
                continue;
            };
            if !order.reservation_expired(now) {
                continue;
            }

            self.reservations.release(order_id).await?;

            match self
                .orders
                .cancel_order(CancelOrder::new(
                    order_id,
                    "checkout expired",
                    Some("expiry-sweep".to_string()),
                ))
                .await
            {
                Ok(_) => {
                    swept += 1;
                    metrics::counter!("checkouts_swept_total").increment(1);
                    self.publish(IntegrationEvent::OrderCancelled {
                        order_id,
                        reason: "checkout expired".to_string(),
                    })
                    .await;
                }
                Err(err) if err.is_conflict() => {
                    tracing::info!(%order_id, "order advanced during sweep, skipping");
                }
                Err(err) => return Err(err.into()),
            }
        }

        if swept > 0 {
            tracing::info!(swept, "expired checkouts cancelled");
        }
        Ok(swept)
    }

    /// Starts fulfillment for a confirmed order.
    pub async fn start_fulfillment(&self, order_id: AggregateId) -> Result<Order> {
        let result = self
            .orders
            .start_fulfillment(StartFulfillment::new(order_id))
            .await?;
        Ok(result.aggregate)
    }

    /// Marks an order shipped and notifies the purchaser.
    pub async fn mark_shipped(
        &self,
        order_id: AggregateId,
        tracking_number: Option<String>,
    ) -> Result<Order> {
        let result = self
            .orders
            .mark_shipped(MarkShipped::new(order_id, tracking_number))
            .await?;
        self.notify(&result.aggregate, "order_shipped").await;
        Ok(result.aggregate)
    }

    /// Marks an order delivered and notifies the purchaser.
    pub async fn mark_delivered(&self, order_id: AggregateId) -> Result<Order> {
        let result = self.orders.mark_delivered(MarkDelivered::new(order_id)).await?;
        self.notify(&result.aggregate, "order_delivered").await;
        Ok(result.aggregate)
    }

    /// Loads an order.
    pub async fn get_order(&self, order_id: AggregateId) -> Result<Option<Order>> {
        Ok(self.orders.get_order(order_id).await?)
    }

    /// Loads the payment attached to an order.
    pub async fn get_payment(&self, order_id: AggregateId) -> Result<Option<domain::Payment>> {
        let Some(order) = self.orders.get_order(order_id).await? else {
            return Ok(None);
        };
        let Some(payment_id) = order.payment_id() else {
            return Ok(None);
        };
        self.payments.get_payment(payment_id).await
    }

    async fn apply_payment_success(
        &self,
        event: &WebhookEvent,
        charge_id: &str,
    ) -> Result<WebhookOutcome> {
        let order = self
            .orders
            .get_order(event.order_id)
            .await?
            .ok_or(SagaError::OrderNotFound(event.order_id))?;

        // A crash after partial processing leaves the order Confirmed but
        // the event unmarked; the redelivery lands here and must not
        // re-fire downstream effects.
        if order.status() == OrderStatus::Confirmed {
            return Ok(WebhookOutcome::Replayed);
        }

        match self.payments.complete(event.payment_id, charge_id).await {
            Ok(_) => {}
            // Redelivery after a crash that completed the payment but not
            // the order: keep driving the remaining steps forward.
            Err(SagaError::Domain(domain::DomainError::Payment(
                domain::PaymentError::NotPending {
                    actual: domain::PaymentStatus::Completed,
                },
            ))) => {}
            Err(err) => return Err(err),
        }

        let confirmed = self
            .orders
            .confirm_order(ConfirmOrder::new(event.order_id))
            .await?
            .aggregate;

        // Holds become permanent deductions; idempotent under redelivery.
        self.reservations.confirm(event.order_id).await?;

        // Invoice trigger fires exactly once per confirmed order.
        let invoice_ref = self.invoices.generate(&confirmed).await?;
        tracing::info!(order_id = %event.order_id, %invoice_ref, "invoice generation triggered");

        self.publish(IntegrationEvent::PaymentCompleted {
            order_id: event.order_id,
            payment_id: event.payment_id,
            amount_cents: confirmed.totals().total.cents(),
        })
        .await;
        self.publish(IntegrationEvent::OrderConfirmed {
            order_id: event.order_id,
        })
        .await;
        self.notify(&confirmed, "order_confirmed").await;

        Ok(WebhookOutcome::Processed)
    }

    async fn apply_payment_failure(
        &self,
        event: &WebhookEvent,
        reason: &str,
        retryable: bool,
    ) -> Result<WebhookOutcome> {
        self.payments.fail(event.payment_id, reason, retryable).await?;

        // Holds are freed on any failure; a retrying customer re-reserves.
        self.reservations.release(event.order_id).await?;

        let order = if retryable {
            self.orders
                .record_payment_retry(RecordPaymentRetry::new(event.order_id, reason))
                .await?
                .aggregate
        } else {
            let cancelled = self
                .orders
                .cancel_order(CancelOrder::new(
                    event.order_id,
                    format!("payment failed: {reason}"),
                    Some("payment-webhook".to_string()),
                ))
                .await?
                .aggregate;
            self.publish(IntegrationEvent::OrderCancelled {
                order_id: event.order_id,
                reason: format!("payment failed: {reason}"),
            })
            .await;
            cancelled
        };

        self.publish(IntegrationEvent::PaymentFailed {
            order_id: event.order_id,
            payment_id: event.payment_id,
            reason: reason.to_string(),
            retryable,
        })
        .await;
        self.notify(&order, "payment_failed").await;

        Ok(WebhookOutcome::Processed)
    }

    async fn cancel_failed_checkout(&self, order_id: AggregateId, reason: String) {
        if let Err(err) = self
            .orders
            .cancel_order(CancelOrder::new(order_id, reason.clone(), None))
            .await
        {
            tracing::error!(%order_id, error = %err, "failed to cancel order after checkout failure");
            return;
        }
        self.publish(IntegrationEvent::OrderCancelled { order_id, reason })
            .await;
    }

    /// Publishes an integration event. The order is already committed, so
    /// a broker hiccup is logged rather than failing the operation.
    async fn publish(&self, event: IntegrationEvent) {
        if let Err(err) = self.bus.publish(event).await {
            tracing::warn!(error = %err, "failed to publish integration event");
        }
    }

    /// Fire-and-forget purchaser notification.
    async fn notify(&self, order: &Order, event: &str) {
        let Some(purchaser) = order.purchaser() else {
            return;
        };
        if let Err(err) = self.notifier.notify(&purchaser.contact(), event).await {
            tracing::warn!(error = %err, event, "notification delivery failed");
        }
    }
}
