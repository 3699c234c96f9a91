//! Payment and refund status enums.

use serde::{Deserialize, Serialize};

/// Status of a payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    /// Intent created, waiting for the gateway webhook.
    #[default]
    Pending,

    /// Funds captured.
    Completed,

    /// Gateway reported a failure.
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a refund record.
///
/// Refunds are recorded as Processing when the gateway accepts the request;
/// settlement confirmation arrives out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefundStatus {
    Processing,
    Completed,
}

impl std::fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefundStatus::Processing => write!(f, "Processing"),
            RefundStatus::Completed => write!(f, "Completed"),
        }
    }
}
