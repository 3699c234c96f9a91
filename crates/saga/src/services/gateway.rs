//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{AggregateId, Currency, Money};

use crate::error::{Result, SagaError};

/// Request to open a payment intent at the gateway.
#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub order_id: AggregateId,
    pub amount: Money,
    pub currency: Currency,
    /// Derived from `(order_id, attempt)`; a retried call with the same
    /// key must return the original intent, never open a second one.
    pub idempotency_key: String,
}

/// A gateway payment intent handed back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayIntent {
    pub intent_id: String,
    /// Client-side secret the storefront uses to complete the payment.
    pub client_secret: String,
}

/// A gateway-accepted refund.
#[derive(Debug, Clone)]
pub struct GatewayRefund {
    pub refund_id: String,
}

/// External payment gateway boundary.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a payment intent.
    async fn create_intent(&self, request: IntentRequest) -> Result<GatewayIntent>;

    /// Refunds part or all of a captured charge.
    async fn refund(
        &self,
        charge_id: &str,
        amount: Money,
        idempotency_key: &str,
    ) -> Result<GatewayRefund>;
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    intents: HashMap<String, (AggregateId, Money, Currency)>,
    refunds: Vec<(String, Money)>,
    intent_idempotency: HashMap<String, GatewayIntent>,
    refund_idempotency: HashMap<String, String>,
    next_id: u32,
    fail_intents_remaining: u32,
    fail_refunds_remaining: u32,
}

/// In-memory payment gateway for tests, with idempotency-key replay and
/// injectable transient failures.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` create_intent calls fail as outages.
    pub fn fail_next_intents(&self, count: u32) {
        self.state.write().unwrap().fail_intents_remaining = count;
    }

    /// Makes the next `count` refund calls fail as outages.
    pub fn fail_next_refunds(&self, count: u32) {
        self.state.write().unwrap().fail_refunds_remaining = count;
    }

    /// Returns the number of intents opened.
    pub fn intent_count(&self) -> usize {
        self.state.read().unwrap().intents.len()
    }

    /// Returns the refunds issued as (charge_id, amount) pairs.
    pub fn refunds(&self) -> Vec<(String, Money)> {
        self.state.read().unwrap().refunds.clone()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_intent(&self, request: IntentRequest) -> Result<GatewayIntent> {
        let mut state = self.state.write().unwrap();

        if let Some(intent) = state.intent_idempotency.get(&request.idempotency_key) {
            return Ok(intent.clone());
        }

        if state.fail_intents_remaining > 0 {
            state.fail_intents_remaining -= 1;
            return Err(SagaError::ExternalService {
                service: "gateway",
                reason: "gateway unavailable".to_string(),
            });
        }

        state.next_id += 1;
        let intent = GatewayIntent {
            intent_id: format!("pi_{:06}", state.next_id),
            client_secret: format!("pi_{:06}_secret", state.next_id),
        };
        state.intents.insert(
            intent.intent_id.clone(),
            (request.order_id, request.amount, request.currency),
        );
        state
            .intent_idempotency
            .insert(request.idempotency_key, intent.clone());

        Ok(intent)
    }

    async fn refund(
        &self,
        charge_id: &str,
        amount: Money,
        idempotency_key: &str,
    ) -> Result<GatewayRefund> {
        let mut state = self.state.write().unwrap();

        if let Some(refund_id) = state.refund_idempotency.get(idempotency_key) {
            return Ok(GatewayRefund {
                refund_id: refund_id.clone(),
            });
        }

        if state.fail_refunds_remaining > 0 {
            state.fail_refunds_remaining -= 1;
            return Err(SagaError::ExternalService {
                service: "gateway",
                reason: "gateway unavailable".to_string(),
            });
        }

        state.next_id += 1;
        let refund_id = format!("re_{:06}", state.next_id);
        state.refunds.push((charge_id.to_string(), amount));
        state
            .refund_idempotency
            .insert(idempotency_key.to_string(), refund_id.clone());

        Ok(GatewayRefund { refund_id })
    }
}
