//! Integration event bus.
//!
//! Publishing is a trait boundary so deployments can plug a real broker
//! in; consumption is an explicit loop with per-message acknowledgement,
//! a bounded retry count, and dead-letter routing — no declarative
//! listener wiring.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::AggregateId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// Topic names for downstream consumers.
pub mod topics {
    pub const ORDER_CREATED: &str = "orders.created";
    pub const ORDER_CONFIRMED: &str = "orders.confirmed";
    pub const ORDER_CANCELLED: &str = "orders.cancelled";
    pub const PAYMENT_COMPLETED: &str = "payments.completed";
    pub const PAYMENT_FAILED: &str = "payments.failed";
}

/// Events published for downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum IntegrationEvent {
    OrderCreated {
        order_id: AggregateId,
        order_number: String,
        total_cents: i64,
    },
    OrderConfirmed {
        order_id: AggregateId,
    },
    OrderCancelled {
        order_id: AggregateId,
        reason: String,
    },
    PaymentCompleted {
        order_id: AggregateId,
        payment_id: AggregateId,
        amount_cents: i64,
    },
    PaymentFailed {
        order_id: AggregateId,
        payment_id: AggregateId,
        reason: String,
        retryable: bool,
    },
}

impl IntegrationEvent {
    /// Returns the topic this event is published on.
    pub fn topic(&self) -> &'static str {
        match self {
            IntegrationEvent::OrderCreated { .. } => topics::ORDER_CREATED,
            IntegrationEvent::OrderConfirmed { .. } => topics::ORDER_CONFIRMED,
            IntegrationEvent::OrderCancelled { .. } => topics::ORDER_CANCELLED,
            IntegrationEvent::PaymentCompleted { .. } => topics::PAYMENT_COMPLETED,
            IntegrationEvent::PaymentFailed { .. } => topics::PAYMENT_FAILED,
        }
    }
}

/// Publish-side boundary of the bus.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes an event on its topic.
    async fn publish(&self, event: IntegrationEvent) -> Result<()>;
}

#[derive(Default)]
struct InMemoryBusState {
    published: Vec<IntegrationEvent>,
    subscribers: HashMap<&'static str, Vec<mpsc::UnboundedSender<IntegrationEvent>>>,
}

/// In-memory event bus: records everything published and fans out to
/// per-topic subscriptions.
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    state: Arc<RwLock<InMemoryBusState>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a subscription for one topic.
    pub fn subscribe(&self, topic: &'static str) -> mpsc::UnboundedReceiver<IntegrationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state
            .write()
            .unwrap()
            .subscribers
            .entry(topic)
            .or_default()
            .push(tx);
        rx
    }

    /// Returns every event published so far.
    pub fn published(&self) -> Vec<IntegrationEvent> {
        self.state.read().unwrap().published.clone()
    }

    /// Returns how many events were published on a topic.
    pub fn published_on(&self, topic: &str) -> usize {
        self.state
            .read()
            .unwrap()
            .published
            .iter()
            .filter(|e| e.topic() == topic)
            .count()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: IntegrationEvent) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if let Some(subscribers) = state.subscribers.get_mut(event.topic()) {
            // Closed subscriptions are dropped on the way through.
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
        state.published.push(event);
        Ok(())
    }
}

/// Handler invoked by a consumer loop for each delivered event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &IntegrationEvent) -> std::result::Result<(), String>;
}

/// Explicit consumer loop over one topic subscription.
///
/// Each message is delivered to the handler and acknowledged on success.
/// A failing delivery is retried up to `max_retries` times; after that the
/// message is routed to the dead-letter queue and acknowledged so the loop
/// keeps moving.
pub struct ConsumerLoop<H: EventHandler> {
    topic: &'static str,
    receiver: mpsc::UnboundedReceiver<IntegrationEvent>,
    handler: H,
    max_retries: u32,
    dead_letters: Arc<RwLock<Vec<IntegrationEvent>>>,
}

impl<H: EventHandler> ConsumerLoop<H> {
    pub fn new(
        topic: &'static str,
        receiver: mpsc::UnboundedReceiver<IntegrationEvent>,
        handler: H,
        max_retries: u32,
    ) -> Self {
        Self {
            topic,
            receiver,
            handler,
            max_retries,
            dead_letters: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Shared handle to the dead-letter queue.
    pub fn dead_letters(&self) -> Arc<RwLock<Vec<IntegrationEvent>>> {
        Arc::clone(&self.dead_letters)
    }

    /// Consumes until the publishing side closes.
    #[tracing::instrument(skip(self), fields(topic = self.topic))]
    pub async fn run(mut self) {
        while let Some(event) = self.receiver.recv().await {
            self.deliver(event).await;
        }
        tracing::info!(topic = self.topic, "consumer loop stopped");
    }

    /// Drains currently queued messages, then returns. For tests and
    /// shutdown paths.
    pub async fn drain(&mut self) {
        while let Ok(event) = self.receiver.try_recv() {
            self.deliver(event).await;
        }
    }

    async fn deliver(&self, event: IntegrationEvent) {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.handler.handle(&event).await {
                Ok(()) => {
                    metrics::counter!("bus_events_consumed_total", "topic" => self.topic)
                        .increment(1);
                    return; // ack
                }
                Err(reason) if attempts <= self.max_retries => {
                    tracing::warn!(
                        topic = self.topic,
                        attempts,
                        %reason,
                        "event delivery failed, retrying"
                    );
                }
                Err(reason) => {
                    tracing::error!(
                        topic = self.topic,
                        attempts,
                        %reason,
                        "event delivery exhausted retries, dead-lettering"
                    );
                    metrics::counter!("bus_events_dead_lettered_total", "topic" => self.topic)
                        .increment(1);
                    self.dead_letters.write().unwrap().push(event);
                    return; // ack after dead-lettering
                }
            }
        }
    }
}
