//! Domain error types.

use event_store::EventStoreError;
use thiserror::Error;

use crate::order::OrderError;
use crate::payment::PaymentError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the event store.
    #[error("event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// An error occurred in the order aggregate.
    #[error("order error: {0}")]
    Order(OrderError),

    /// An error occurred in the payment aggregate.
    #[error("payment error: {0}")]
    Payment(PaymentError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// True when this error is a lost race or invalid transition: the
    /// caller should re-read and decide instead of retrying blindly.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            DomainError::EventStore(EventStoreError::ConcurrencyConflict { .. })
                | DomainError::Order(OrderError::InvalidTransition { .. })
                | DomainError::Order(OrderError::UnexpectedStatus { .. })
                | DomainError::Payment(PaymentError::NotPending { .. })
        )
    }
}
