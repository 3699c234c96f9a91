//! Order lifecycle state machine.

use serde::{Deserialize, Serialize};

/// The state of an order in its lifecycle.
///
/// ```text
/// Draft ──► Confirmed ──► Processing ──► Shipped ──► Delivered
///   │           │              │            │            │
///   │           │              │            └──► Refunded◄┘
///   └───────────┴──────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Checkout in flight: inventory held, payment not yet confirmed.
    #[default]
    Draft,

    /// Payment captured, inventory deducted.
    Confirmed,

    /// Being picked and packed.
    Processing,

    /// Handed to the carrier.
    Shipped,

    /// Received by the customer.
    Delivered,

    /// Abandoned, declined, or cancelled by the customer (terminal).
    Cancelled,

    /// Money returned in full after capture (terminal).
    Refunded,
}

/// The allowed transitions, as one immutable table.
///
/// Anything not listed here is rejected. Side effects (inventory
/// confirm/release, refund triggers, notifications) are never fired from
/// the state machine itself; the orchestrator runs them after a
/// successful transition commits.
const TRANSITIONS: &[(OrderStatus, OrderStatus)] = &[
    (OrderStatus::Draft, OrderStatus::Confirmed),
    (OrderStatus::Draft, OrderStatus::Cancelled),
    (OrderStatus::Confirmed, OrderStatus::Processing),
    (OrderStatus::Confirmed, OrderStatus::Cancelled),
    (OrderStatus::Processing, OrderStatus::Shipped),
    (OrderStatus::Processing, OrderStatus::Cancelled),
    (OrderStatus::Shipped, OrderStatus::Delivered),
    (OrderStatus::Shipped, OrderStatus::Refunded),
    (OrderStatus::Delivered, OrderStatus::Refunded),
];

impl OrderStatus {
    /// Returns true if the transition `from` → `to` is allowed.
    pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
        TRANSITIONS.contains(&(from, to))
    }

    /// Returns true if this state allows a transition to `to`.
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        Self::can_transition(*self, to)
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "Draft",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
