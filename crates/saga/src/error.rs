//! Saga error taxonomy.
//!
//! Five kinds drive recovery and HTTP mapping: validation errors are
//! rejected before side effects, state conflicts tell the caller to
//! re-read, business-rule violations carry actionable detail (which SKUs,
//! how much is refundable), security errors are never retried, and
//! external-service errors are the only retryable class.

use common::AggregateId;
use domain::{DomainError, OrderError, PaymentError};
use event_store::EventStoreError;
use thiserror::Error;

/// Classification used for recovery decisions and HTTP status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    StateConflict,
    BusinessRule,
    Security,
    ExternalService,
    NotFound,
    Internal,
}

/// Errors that can occur during checkout orchestration.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Malformed input, rejected before any side effect.
    #[error("validation failed: {0}")]
    Validation(String),

    /// One or more SKUs could not be reserved. Every hold already granted
    /// for the order was released before this error was returned.
    #[error("insufficient stock for: {}", skus.join(", "))]
    OutOfStock { skus: Vec<String> },

    /// Refund request exceeds what is still refundable on the payment.
    #[error("refund of {requested} cents exceeds refundable balance of {refundable} cents")]
    RefundExceedsCaptured { requested: i64, refundable: i64 },

    /// Refunds require a completed payment.
    #[error("payment for order {0} is not completed")]
    PaymentNotCompleted(AggregateId),

    /// An external collaborator failed after retries.
    #[error("{service} error: {reason}")]
    ExternalService { service: &'static str, reason: String },

    /// The circuit breaker for a collaborator is open; failing fast
    /// instead of blocking checkout.
    #[error("{service} circuit is open")]
    CircuitOpen { service: &'static str },

    /// Webhook signature verification failed. Never retried; no state was
    /// mutated.
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// The webhook payload did not parse after signature verification.
    #[error("malformed webhook payload: {0}")]
    MalformedWebhook(String),

    /// Order not found.
    #[error("order not found: {0}")]
    OrderNotFound(AggregateId),

    /// No payment exists for the order.
    #[error("no payment for order {0}")]
    PaymentNotFound(AggregateId),

    /// Domain error (transition rejections, validation, lost races).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Event store error.
    #[error("event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SagaError {
    /// Classifies the error for recovery and response mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SagaError::Validation(_) | SagaError::MalformedWebhook(_) => ErrorKind::Validation,
            SagaError::OutOfStock { .. }
            | SagaError::RefundExceedsCaptured { .. }
            | SagaError::PaymentNotCompleted(_) => ErrorKind::BusinessRule,
            SagaError::ExternalService { .. } | SagaError::CircuitOpen { .. } => {
                ErrorKind::ExternalService
            }
            SagaError::InvalidSignature => ErrorKind::Security,
            SagaError::OrderNotFound(_) | SagaError::PaymentNotFound(_) => ErrorKind::NotFound,
            SagaError::Domain(e) => classify_domain(e),
            SagaError::EventStore(EventStoreError::ConcurrencyConflict { .. }) => {
                ErrorKind::StateConflict
            }
            SagaError::EventStore(_) | SagaError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// True for transient failures worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, SagaError::ExternalService { .. })
    }
}

fn classify_domain(e: &DomainError) -> ErrorKind {
    match e {
        DomainError::EventStore(EventStoreError::ConcurrencyConflict { .. }) => {
            ErrorKind::StateConflict
        }
        DomainError::EventStore(_) | DomainError::Serialization(_) => ErrorKind::Internal,
        DomainError::Order(o) => match o {
            OrderError::InvalidTransition { .. } | OrderError::UnexpectedStatus { .. } => {
                ErrorKind::StateConflict
            }
            OrderError::NotCreated => ErrorKind::NotFound,
            _ => ErrorKind::Validation,
        },
        DomainError::Payment(p) => match p {
            PaymentError::NotPending { .. } => ErrorKind::StateConflict,
            PaymentError::NotCompleted { .. } | PaymentError::RefundExceedsCaptured { .. } => {
                ErrorKind::BusinessRule
            }
            PaymentError::NotCreated => ErrorKind::NotFound,
            _ => ErrorKind::Validation,
        },
    }
}

/// Convenience alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_as_documented() {
        assert_eq!(
            SagaError::Validation("empty cart".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            SagaError::OutOfStock {
                skus: vec!["SKU-C".into()]
            }
            .kind(),
            ErrorKind::BusinessRule
        );
        assert_eq!(SagaError::InvalidSignature.kind(), ErrorKind::Security);
        assert_eq!(
            SagaError::CircuitOpen { service: "stock" }.kind(),
            ErrorKind::ExternalService
        );
        assert_eq!(
            SagaError::OrderNotFound(AggregateId::new()).kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn invalid_transition_is_a_state_conflict() {
        let err = SagaError::Domain(DomainError::Order(OrderError::InvalidTransition {
            from: domain::OrderStatus::Draft,
            to: domain::OrderStatus::Shipped,
        }));
        assert_eq!(err.kind(), ErrorKind::StateConflict);
    }

    #[test]
    fn only_external_service_errors_are_transient() {
        assert!(
            SagaError::ExternalService {
                service: "stock",
                reason: "timeout".into()
            }
            .is_transient()
        );
        assert!(!SagaError::InvalidSignature.is_transient());
        assert!(!SagaError::CircuitOpen { service: "stock" }.is_transient());
    }

    #[test]
    fn out_of_stock_message_names_skus() {
        let err = SagaError::OutOfStock {
            skus: vec!["SKU-A".into(), "SKU-B".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("SKU-A"));
        assert!(msg.contains("SKU-B"));
    }
}
