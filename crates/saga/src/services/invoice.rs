//! Invoice generator boundary.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::Order;

use crate::error::Result;

/// Stateless invoice generation trigger, invoked once per confirmed order.
/// Rendering and legal formatting live behind this boundary.
#[async_trait]
pub trait InvoiceGenerator: Send + Sync {
    /// Generates an invoice document for the order snapshot and returns
    /// its document reference.
    async fn generate(&self, order: &Order) -> Result<String>;
}

/// In-memory invoice generator recording every trigger.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInvoiceGenerator {
    generated: Arc<RwLock<Vec<String>>>,
}

impl InMemoryInvoiceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many invoices were generated.
    pub fn generated_count(&self) -> usize {
        self.generated.read().unwrap().len()
    }

    /// Returns the order numbers invoiced so far.
    pub fn invoiced_orders(&self) -> Vec<String> {
        self.generated.read().unwrap().clone()
    }
}

#[async_trait]
impl InvoiceGenerator for InMemoryInvoiceGenerator {
    async fn generate(&self, order: &Order) -> Result<String> {
        let number = order
            .order_number()
            .map(|n| n.to_string())
            .unwrap_or_default();
        self.generated.write().unwrap().push(number.clone());
        Ok(format!("invoice-{number}"))
    }
}
