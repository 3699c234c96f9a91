//! Inventory reservation coordinator.
//!
//! Reservation is all-or-nothing across an order's line items: the first
//! failing item releases every hold already granted in the same call
//! before the error is returned, so no order is ever left with a partial
//! reservation. `confirm` and `release` are idempotent per order.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use common::AggregateId;
use domain::{OrderItem, Sku};

use crate::error::{Result, SagaError};
use crate::retry::{CircuitBreaker, RetryPolicy};
use crate::services::StockService;

/// State of an order's reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldState {
    /// Soft holds placed, awaiting payment confirmation.
    Held,
    /// Holds converted to permanent deductions.
    Confirmed,
    /// Holds freed (compensation, expiry, or payment failure).
    Released,
}

/// One order's reservation: the external hold per SKU plus expiry.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub reference: String,
    pub holds: Vec<(Sku, String)>,
    pub expires_at: DateTime<Utc>,
    pub state: HoldState,
}

/// A granted reservation reference handed back to the orchestrator.
#[derive(Debug, Clone)]
pub struct ReservationGrant {
    pub reference: String,
    pub expires_at: DateTime<Utc>,
}

/// Coordinates soft inventory holds against the external stock service.
pub struct ReservationCoordinator<S: StockService> {
    stock: S,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    reservations: Arc<RwLock<HashMap<AggregateId, Reservation>>>,
}

impl<S: StockService> ReservationCoordinator<S> {
    pub fn new(stock: S, retry: RetryPolicy) -> Self {
        Self {
            stock,
            retry,
            breaker: CircuitBreaker::new("stock", 5, std::time::Duration::from_secs(30)),
            reservations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Reserves every line item, or nothing.
    ///
    /// One stock call per item, each under retry with the idempotency key
    /// `(order_id, sku)`. On the first failure all holds granted in this
    /// call are released before the error (naming the failing SKUs for
    /// stock shortages) is returned.
    #[tracing::instrument(skip(self, items), fields(%order_id, item_count = items.len()))]
    pub async fn reserve(
        &self,
        order_id: AggregateId,
        items: &[OrderItem],
        ttl: Duration,
    ) -> Result<ReservationGrant> {
        self.breaker.guard()?;

        let mut granted: Vec<(Sku, String)> = Vec::with_capacity(items.len());

        for item in items {
            let key = format!("{order_id}:{}", item.sku);
            let result = self
                .retry
                .run("stock.reserve", || {
                    self.stock.reserve(&key, &item.sku, item.quantity, ttl)
                })
                .await;

            match result {
                Ok(hold_id) => granted.push((item.sku.clone(), hold_id)),
                Err(err) => {
                    // All-or-nothing: free what this call already took.
                    self.release_holds(&granted).await;

                    if err.is_transient() {
                        self.breaker.record_failure();
                    }
                    metrics::counter!("reservations_failed_total").increment(1);
                    tracing::warn!(%order_id, sku = %item.sku, error = %err, "reservation failed, holds rolled back");
                    return Err(err);
                }
            }
        }

        self.breaker.record_success();

        let expires_at = Utc::now() + ttl;
        let reference = format!(
            "rsv-{}",
            &order_id.as_uuid().simple().to_string()[..12]
        );
        self.reservations.write().unwrap().insert(
            order_id,
            Reservation {
                reference: reference.clone(),
                holds: granted,
                expires_at,
                state: HoldState::Held,
            },
        );

        metrics::counter!("reservations_granted_total").increment(1);
        Ok(ReservationGrant {
            reference,
            expires_at,
        })
    }

    /// Converts the order's holds into permanent deductions.
    ///
    /// Idempotent: calling again after success (webhook redelivery) is a
    /// no-op.
    #[tracing::instrument(skip(self), fields(%order_id))]
    pub async fn confirm(&self, order_id: AggregateId) -> Result<()> {
        let (hold_ids, state) = {
            let reservations = self.reservations.read().unwrap();
            match reservations.get(&order_id) {
                None => {
                    return Err(SagaError::Validation(format!(
                        "no reservation for order {order_id}"
                    )));
                }
                Some(r) => (
                    r.holds.iter().map(|(_, id)| id.clone()).collect::<Vec<_>>(),
                    r.state,
                ),
            }
        };

        match state {
            HoldState::Confirmed => Ok(()), // already done
            HoldState::Released => Err(SagaError::Validation(format!(
                "reservation for order {order_id} was already released"
            ))),
            HoldState::Held => {
                self.retry
                    .run("stock.confirm", || self.stock.confirm(&hold_ids))
                    .await?;
                if let Some(r) = self.reservations.write().unwrap().get_mut(&order_id) {
                    r.state = HoldState::Confirmed;
                }
                Ok(())
            }
        }
    }

    /// Frees the order's holds.
    ///
    /// Idempotent and safe when no reservation exists, it already expired,
    /// or it was already released.
    #[tracing::instrument(skip(self), fields(%order_id))]
    pub async fn release(&self, order_id: AggregateId) -> Result<()> {
        let hold_ids = {
            let reservations = self.reservations.read().unwrap();
            match reservations.get(&order_id) {
                None => return Ok(()),
                Some(r) if r.state != HoldState::Held => return Ok(()),
                Some(r) => r.holds.iter().map(|(_, id)| id.clone()).collect::<Vec<_>>(),
            }
        };

        self.retry
            .run("stock.release", || self.stock.release(&hold_ids))
            .await?;

        if let Some(r) = self.reservations.write().unwrap().get_mut(&order_id) {
            r.state = HoldState::Released;
        }
        metrics::counter!("reservations_released_total").increment(1);
        Ok(())
    }

    /// Orders whose holds lapsed before `now` and were never confirmed.
    /// Input for the abandoned-checkout sweep.
    pub fn expired_orders(&self, now: DateTime<Utc>) -> Vec<AggregateId> {
        self.reservations
            .read()
            .unwrap()
            .iter()
            .filter(|(_, r)| r.state == HoldState::Held && r.expires_at < now)
            .map(|(order_id, _)| *order_id)
            .collect()
    }

    /// Looks up an order's reservation.
    pub fn reservation(&self, order_id: AggregateId) -> Option<Reservation> {
        self.reservations.read().unwrap().get(&order_id).cloned()
    }

    async fn release_holds(&self, granted: &[(Sku, String)]) {
        if granted.is_empty() {
            return;
        }
        let hold_ids: Vec<String> = granted.iter().map(|(_, id)| id.clone()).collect();
        if let Err(err) = self.stock.release(&hold_ids).await {
            // Holds have a TTL; an unreleased hold self-expires.
            tracing::error!(error = %err, "failed to roll back partial holds");
        }
    }
}
