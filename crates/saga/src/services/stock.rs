//! Stock service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Duration;
use domain::Sku;

use crate::error::{Result, SagaError};

/// External stock/inventory service boundary.
///
/// Holds are soft: quantity moves out of the available pool but is not
/// deducted until confirmed. Every call carries the caller's idempotency
/// key so a retried RPC never creates a second hold.
#[async_trait]
pub trait StockService: Send + Sync {
    /// Places a hold for one line item and returns the hold id.
    async fn reserve(
        &self,
        idempotency_key: &str,
        sku: &Sku,
        quantity: u32,
        ttl: Duration,
    ) -> Result<String>;

    /// Converts holds into permanent deductions.
    async fn confirm(&self, hold_ids: &[String]) -> Result<()>;

    /// Frees holds, returning quantity to the available pool. Unknown
    /// hold ids are ignored.
    async fn release(&self, hold_ids: &[String]) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryStockState {
    available: HashMap<Sku, u32>,
    holds: HashMap<String, (Sku, u32)>,
    confirmed: HashMap<String, (Sku, u32)>,
    idempotency: HashMap<String, String>,
    next_id: u32,
    fail_reserves_remaining: u32,
}

/// In-memory stock service for tests.
///
/// Tracks per-SKU availability so insufficient-stock and concurrent
/// last-unit scenarios behave like the real service. Reservation is an
/// atomic check-and-hold under one lock: for the last unit of a SKU,
/// exactly one concurrent caller wins.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockService {
    state: Arc<RwLock<InMemoryStockState>>,
}

impl InMemoryStockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the available quantity for a SKU.
    pub fn set_stock(&self, sku: impl Into<Sku>, quantity: u32) {
        self.state
            .write()
            .unwrap()
            .available
            .insert(sku.into(), quantity);
    }

    /// Makes the next `count` reserve calls fail as transient outages.
    pub fn fail_next_reserves(&self, count: u32) {
        self.state.write().unwrap().fail_reserves_remaining = count;
    }

    /// Returns the available (unheld) quantity for a SKU.
    pub fn available(&self, sku: &Sku) -> u32 {
        self.state
            .read()
            .unwrap()
            .available
            .get(sku)
            .copied()
            .unwrap_or(0)
    }

    /// Returns the number of active (unconfirmed) holds.
    pub fn hold_count(&self) -> usize {
        self.state.read().unwrap().holds.len()
    }

    /// Returns the number of confirmed deductions.
    pub fn confirmed_count(&self) -> usize {
        self.state.read().unwrap().confirmed.len()
    }
}

#[async_trait]
impl StockService for InMemoryStockService {
    async fn reserve(
        &self,
        idempotency_key: &str,
        sku: &Sku,
        quantity: u32,
        _ttl: Duration,
    ) -> Result<String> {
        let mut state = self.state.write().unwrap();

        // Idempotent replay: the retried call gets the original hold.
        if let Some(hold_id) = state.idempotency.get(idempotency_key) {
            return Ok(hold_id.clone());
        }

        if state.fail_reserves_remaining > 0 {
            state.fail_reserves_remaining -= 1;
            return Err(SagaError::ExternalService {
                service: "stock",
                reason: "stock service unavailable".to_string(),
            });
        }

        let available = state.available.get(sku).copied().unwrap_or(0);
        if available < quantity {
            return Err(SagaError::OutOfStock {
                skus: vec![sku.to_string()],
            });
        }

        state.available.insert(sku.clone(), available - quantity);
        state.next_id += 1;
        let hold_id = format!("hold-{:04}", state.next_id);
        state.holds.insert(hold_id.clone(), (sku.clone(), quantity));
        state
            .idempotency
            .insert(idempotency_key.to_string(), hold_id.clone());

        Ok(hold_id)
    }

    async fn confirm(&self, hold_ids: &[String]) -> Result<()> {
        let mut state = self.state.write().unwrap();
        for hold_id in hold_ids {
            if let Some(hold) = state.holds.remove(hold_id) {
                state.confirmed.insert(hold_id.clone(), hold);
            }
        }
        Ok(())
    }

    async fn release(&self, hold_ids: &[String]) -> Result<()> {
        let mut state = self.state.write().unwrap();
        for hold_id in hold_ids {
            if let Some((sku, quantity)) = state.holds.remove(hold_id) {
                *state.available.entry(sku).or_insert(0) += quantity;
            }
        }
        Ok(())
    }
}
