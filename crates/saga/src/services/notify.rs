//! Notification sender boundary.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::Result;

/// Fire-and-forget customer notifications. Delivery failures are logged by
/// callers, never propagated into the checkout path.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Sends `event` to `recipient` (customer id or guest email).
    async fn notify(&self, recipient: &str, event: &str) -> Result<()>;
}

/// In-memory notification sender recording (recipient, event) pairs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationSender {
    sent: Arc<RwLock<Vec<(String, String)>>>,
}

impl InMemoryNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.read().unwrap().clone()
    }

    pub fn count_for(&self, event: &str) -> usize {
        self.sent
            .read()
            .unwrap()
            .iter()
            .filter(|(_, e)| e == event)
            .count()
    }
}

#[async_trait]
impl NotificationSender for InMemoryNotificationSender {
    async fn notify(&self, recipient: &str, event: &str) -> Result<()> {
        self.sent
            .write()
            .unwrap()
            .push((recipient.to_string(), event.to_string()));
        Ok(())
    }
}
