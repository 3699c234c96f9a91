//! Payment aggregate: local record of gateway state and refunds.

mod aggregate;
mod commands;
mod events;
mod service;
mod state;

pub use aggregate::{Payment, RefundRecord};
pub use commands::*;
pub use events::{
    PaymentCompletedData, PaymentEvent, PaymentFailedData, PaymentInitiatedData,
    RefundRequestedData,
};
pub use service::PaymentService;
pub use state::{PaymentStatus, RefundStatus};

use thiserror::Error;

/// Errors that can occur during payment operations.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The payment record does not exist yet.
    #[error("payment does not exist")]
    NotCreated,

    /// The payment was already initiated.
    #[error("payment already initiated")]
    AlreadyInitiated,

    /// The operation requires a pending payment.
    #[error("payment is {actual}, expected Pending")]
    NotPending { actual: PaymentStatus },

    /// Refunds require a completed payment.
    #[error("payment is {actual}, expected Completed")]
    NotCompleted { actual: PaymentStatus },

    /// The amount must be positive.
    #[error("invalid amount: {amount}")]
    InvalidAmount { amount: i64 },

    /// The refund exceeds what can still be returned.
    #[error("refund {requested} exceeds refundable balance {refundable}")]
    RefundExceedsCaptured { requested: i64, refundable: i64 },
}
