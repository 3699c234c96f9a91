//! Gateway webhook verification and replay protection.
//!
//! Signature verification runs before anything else touches the payload.
//! A payload that fails verification produces a security error and zero
//! state mutation; this ordering is a hard invariant of the webhook path.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::AggregateId;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Result, SagaError};

type HmacSha256 = Hmac<Sha256>;

/// Verifies gateway webhook signatures (HMAC-SHA256 over the raw payload,
/// hex-encoded, shared endpoint secret).
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verifies `signature_hex` against the raw payload. Comparison is
    /// constant-time via the MAC's own verify.
    pub fn verify(&self, payload: &[u8], signature_hex: &str) -> Result<()> {
        let signature = hex::decode(signature_hex).map_err(|_| SagaError::InvalidSignature)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| SagaError::InvalidSignature)?;
        mac.update(payload);
        mac.verify_slice(&signature)
            .map_err(|_| SagaError::InvalidSignature)
    }

    /// Signs a payload. Used by tests and gateway doubles.
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts any key length");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }
}

/// A verified gateway webhook event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Gateway-unique event id; the key for replay protection.
    pub event_id: String,
    /// The intent this event refers to.
    pub intent_id: String,
    /// Local order id carried in the intent metadata.
    pub order_id: AggregateId,
    /// Local payment id carried in the intent metadata.
    pub payment_id: AggregateId,
    #[serde(flatten)]
    pub kind: WebhookEventKind,
}

/// Outcome the gateway reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum WebhookEventKind {
    /// Funds were captured.
    PaymentSucceeded { charge_id: String },

    /// The payment failed; `retryable` distinguishes temporary declines
    /// from terminal ones (fraud signals).
    PaymentFailed { reason: String, retryable: bool },
}

impl WebhookEvent {
    /// Parses a verified payload.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| SagaError::MalformedWebhook(e.to_string()))
    }
}

/// Set of webhook event ids that have completed processing.
///
/// Redelivered events whose id is already present are acknowledged without
/// touching any state.
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    async fn is_processed(&self, event_id: &str) -> Result<bool>;
    async fn mark_processed(&self, event_id: &str) -> Result<()>;
}

/// In-memory processed-event set.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProcessedEvents {
    seen: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryProcessedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.seen.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.read().unwrap().is_empty()
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryProcessedEvents {
    async fn is_processed(&self, event_id: &str) -> Result<bool> {
        Ok(self.seen.read().unwrap().contains(event_id))
    }

    async fn mark_processed(&self, event_id: &str) -> Result<()> {
        self.seen.write().unwrap().insert(event_id.to_string());
        Ok(())
    }
}
