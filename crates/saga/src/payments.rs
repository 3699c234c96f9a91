//! Payment coordinator: gateway intents, local payment records, refunds.

use chrono::{DateTime, Duration, Utc};
use common::{AggregateId, Currency, Money};
use domain::{
    Aggregate, CompletePayment, FailPayment, InitiatePayment, Order, OrderStatus, Payment,
    PaymentService, RequestRefund,
};
use event_store::EventStore;

use crate::error::{Result, SagaError};
use crate::retry::{CircuitBreaker, RetryPolicy};
use crate::services::{IntentRequest, PaymentGateway};

/// Client-facing payment intent returned from checkout.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub payment_id: AggregateId,
    pub intent_id: String,
    pub client_secret: String,
    pub amount: Money,
    pub currency: Currency,
    /// The client must complete payment before this moment.
    pub expires_at: DateTime<Utc>,
}

/// Result of a processed refund.
#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub refund_id: String,
    pub refunded_amount: Money,
    /// True once cumulative refunds reach the captured amount.
    pub fully_refunded: bool,
}

/// Coordinates the payment gateway and the local payment ledger.
pub struct PaymentCoordinator<S: EventStore, G: PaymentGateway> {
    payments: PaymentService<S>,
    gateway: G,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl<S: EventStore, G: PaymentGateway> PaymentCoordinator<S, G> {
    pub fn new(store: S, gateway: G, retry: RetryPolicy) -> Self {
        Self {
            payments: PaymentService::new(store),
            gateway,
            retry,
            breaker: CircuitBreaker::new("gateway", 5, std::time::Duration::from_secs(30)),
        }
    }

    /// Opens a gateway intent for a Draft order and records the pending
    /// payment.
    ///
    /// The idempotency key is derived from `(order_id, attempt)`, where the
    /// attempt is the order's retry counter: a retried RPC can never open a
    /// second intent, while a genuine retry after a decline gets a fresh
    /// one.
    #[tracing::instrument(skip(self, order), fields(order_id = ?order.id()))]
    pub async fn create_intent(
        &self,
        order: &Order,
        currency: Currency,
        intent_ttl: Duration,
    ) -> Result<PaymentIntent> {
        let order_id = order
            .id()
            .ok_or_else(|| SagaError::Validation("order has no id".to_string()))?;

        if order.status() != OrderStatus::Draft {
            return Err(SagaError::Domain(domain::DomainError::Order(
                domain::OrderError::UnexpectedStatus {
                    expected: OrderStatus::Draft,
                    actual: order.status(),
                },
            )));
        }

        let amount = order.totals().total;
        let idempotency_key = format!("{order_id}:attempt-{}", order.retry_count());

        self.breaker.guard()?;
        let request = IntentRequest {
            order_id,
            amount,
            currency,
            idempotency_key,
        };
        let intent = match self
            .retry
            .run("gateway.create_intent", || {
                self.gateway.create_intent(request.clone())
            })
            .await
        {
            Ok(intent) => {
                self.breaker.record_success();
                intent
            }
            Err(err) => {
                if err.is_transient() {
                    self.breaker.record_failure();
                }
                return Err(err);
            }
        };

        let cmd = InitiatePayment::new(order_id, amount, currency, intent.intent_id.clone());
        let payment_id = cmd.payment_id;
        self.payments.initiate(cmd).await?;

        metrics::counter!("payment_intents_created_total").increment(1);
        Ok(PaymentIntent {
            payment_id,
            intent_id: intent.intent_id,
            client_secret: intent.client_secret,
            amount,
            currency,
            expires_at: Utc::now() + intent_ttl,
        })
    }

    /// Marks the payment captured.
    pub async fn complete(&self, payment_id: AggregateId, charge_id: &str) -> Result<Payment> {
        let result = self
            .payments
            .complete(CompletePayment::new(payment_id, charge_id))
            .await?;
        Ok(result.aggregate)
    }

    /// Marks the payment failed with the gateway's reason.
    pub async fn fail(
        &self,
        payment_id: AggregateId,
        reason: &str,
        retryable: bool,
    ) -> Result<Payment> {
        let result = self
            .payments
            .fail(FailPayment::new(payment_id, reason, retryable))
            .await?;
        Ok(result.aggregate)
    }

    /// Refunds part or all of a captured payment.
    ///
    /// Validates against the local record before any gateway call: the
    /// payment must be completed and the amount must not exceed the
    /// refundable balance (captured minus already refunded).
    #[tracing::instrument(skip(self), fields(%order_id, %payment_id))]
    pub async fn process_refund(
        &self,
        order_id: AggregateId,
        payment_id: AggregateId,
        amount: Money,
    ) -> Result<RefundOutcome> {
        let payment = self
            .payments
            .get_payment(payment_id)
            .await?
            .ok_or(SagaError::PaymentNotFound(order_id))?;

        if payment.status() != domain::PaymentStatus::Completed {
            return Err(SagaError::PaymentNotCompleted(order_id));
        }
        if !amount.is_positive() {
            return Err(SagaError::Validation(format!(
                "refund amount must be positive, got {amount}"
            )));
        }
        let refundable = payment.refundable_balance();
        if amount > refundable {
            return Err(SagaError::RefundExceedsCaptured {
                requested: amount.cents(),
                refundable: refundable.cents(),
            });
        }

        let charge_id = payment
            .charge_id()
            .ok_or_else(|| SagaError::Validation("completed payment has no charge".to_string()))?
            .to_string();
        let idempotency_key = format!("{order_id}:refund-{}", payment.refunds().len() + 1);

        self.breaker.guard()?;
        let refund = match self
            .retry
            .run("gateway.refund", || {
                self.gateway.refund(&charge_id, amount, &idempotency_key)
            })
            .await
        {
            Ok(refund) => {
                self.breaker.record_success();
                refund
            }
            Err(err) => {
                if err.is_transient() {
                    self.breaker.record_failure();
                }
                return Err(err);
            }
        };

        let result = self
            .payments
            .request_refund(RequestRefund::new(
                payment_id,
                refund.refund_id.clone(),
                amount,
            ))
            .await?;

        metrics::counter!("refunds_processed_total").increment(1);
        Ok(RefundOutcome {
            refund_id: refund.refund_id,
            refunded_amount: amount,
            fully_refunded: result.aggregate.is_fully_refunded(),
        })
    }

    /// Loads a payment record.
    pub async fn get_payment(&self, payment_id: AggregateId) -> Result<Option<Payment>> {
        Ok(self.payments.get_payment(payment_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryPaymentGateway;
    use domain::{
        CreateOrder, CustomerId, OrderItem, OrderService, Purchaser, ShippingRule,
        calculate_totals,
    };
    use event_store::InMemoryEventStore;

    async fn draft_order(store: &InMemoryEventStore) -> Order {
        let orders = OrderService::new(store.clone());
        let items = vec![OrderItem::new("SKU-A", 1, Money::from_cents(9292))];
        let totals =
            calculate_totals(&items, 0, &ShippingRule::flat(Money::zero()), Money::zero())
                .unwrap();
        let cmd = CreateOrder::new(Purchaser::Customer(CustomerId::new()), items, totals);
        orders.create_order(cmd).await.unwrap().aggregate
    }

    fn coordinator(
        store: InMemoryEventStore,
        gateway: InMemoryPaymentGateway,
    ) -> PaymentCoordinator<InMemoryEventStore, InMemoryPaymentGateway> {
        PaymentCoordinator::new(store, gateway, RetryPolicy::immediate(3))
    }

    #[tokio::test]
    async fn create_intent_for_draft_order() {
        let store = InMemoryEventStore::new();
        let gateway = InMemoryPaymentGateway::new();
        let order = draft_order(&store).await;
        let coordinator = coordinator(store, gateway.clone());

        let intent = coordinator
            .create_intent(&order, Currency::Eur, Duration::minutes(15))
            .await
            .unwrap();

        assert_eq!(intent.amount.cents(), 9292);
        assert!(intent.expires_at > Utc::now());
        assert_eq!(gateway.intent_count(), 1);

        let payment = coordinator
            .get_payment(intent.payment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.status(), domain::PaymentStatus::Pending);
        assert_eq!(payment.intent_id(), Some(intent.intent_id.as_str()));
    }

    #[tokio::test]
    async fn create_intent_requires_draft() {
        let store = InMemoryEventStore::new();
        let gateway = InMemoryPaymentGateway::new();
        let order = draft_order(&store).await;
        let orders = OrderService::new(store.clone());
        let confirmed = orders
            .confirm_order(domain::ConfirmOrder::new(order.id().unwrap()))
            .await
            .unwrap()
            .aggregate;

        let coordinator = coordinator(store, gateway.clone());
        let result = coordinator
            .create_intent(&confirmed, Currency::Eur, Duration::minutes(15))
            .await;

        assert!(result.is_err());
        assert_eq!(gateway.intent_count(), 0);
    }

    #[tokio::test]
    async fn transient_gateway_failure_is_retried() {
        let store = InMemoryEventStore::new();
        let gateway = InMemoryPaymentGateway::new();
        gateway.fail_next_intents(2);
        let order = draft_order(&store).await;
        let coordinator = coordinator(store, gateway.clone());

        let intent = coordinator
            .create_intent(&order, Currency::Eur, Duration::minutes(15))
            .await;

        assert!(intent.is_ok());
        // Retries reused the idempotency key: one intent total.
        assert_eq!(gateway.intent_count(), 1);
    }

    #[tokio::test]
    async fn refund_validates_before_gateway_call() {
        let store = InMemoryEventStore::new();
        let gateway = InMemoryPaymentGateway::new();
        let order = draft_order(&store).await;
        let order_id = order.id().unwrap();
        let coordinator = coordinator(store, gateway.clone());

        let intent = coordinator
            .create_intent(&order, Currency::Eur, Duration::minutes(15))
            .await
            .unwrap();

        // Pending payment: refund is a business-rule violation.
        let result = coordinator
            .process_refund(order_id, intent.payment_id, Money::from_cents(100))
            .await;
        assert!(matches!(result, Err(SagaError::PaymentNotCompleted(_))));

        coordinator.complete(intent.payment_id, "ch_1").await.unwrap();

        // 150.00 against captured 92.92: rejected, gateway untouched.
        let result = coordinator
            .process_refund(order_id, intent.payment_id, Money::from_cents(15_000))
            .await;
        assert!(matches!(
            result,
            Err(SagaError::RefundExceedsCaptured {
                requested: 15_000,
                refundable: 9292,
            })
        ));
        assert!(gateway.refunds().is_empty());
    }

    #[tokio::test]
    async fn partial_then_full_refund() {
        let store = InMemoryEventStore::new();
        let gateway = InMemoryPaymentGateway::new();
        let order = draft_order(&store).await;
        let order_id = order.id().unwrap();
        let coordinator = coordinator(store, gateway.clone());

        let intent = coordinator
            .create_intent(&order, Currency::Eur, Duration::minutes(15))
            .await
            .unwrap();
        coordinator.complete(intent.payment_id, "ch_1").await.unwrap();

        let first = coordinator
            .process_refund(order_id, intent.payment_id, Money::from_cents(5_000))
            .await
            .unwrap();
        assert!(!first.fully_refunded);

        let second = coordinator
            .process_refund(order_id, intent.payment_id, Money::from_cents(4_292))
            .await
            .unwrap();
        assert!(second.fully_refunded);
        assert_eq!(gateway.refunds().len(), 2);
    }
}
