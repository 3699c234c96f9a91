//! Value objects for the order domain.

use common::{AggregateId, Money};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OrderError;

/// Unique identifier for an authenticated customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(Uuid);

impl CustomerId {
    /// Creates a new random customer ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a customer ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CustomerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who placed the order: an authenticated customer or a guest identified
/// by email. The two are mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Purchaser {
    /// Authenticated customer.
    Customer(CustomerId),

    /// Guest checkout, identified by email.
    Guest(String),
}

impl Purchaser {
    /// Creates a guest purchaser, validating the email shape.
    pub fn guest(email: impl Into<String>) -> Result<Self, OrderError> {
        let email = email.into();
        let valid = email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        });
        if valid {
            Ok(Purchaser::Guest(email))
        } else {
            Err(OrderError::InvalidGuestEmail { email })
        }
    }

    /// Returns a display handle for notifications.
    pub fn contact(&self) -> String {
        match self {
            Purchaser::Customer(id) => id.to_string(),
            Purchaser::Guest(email) => email.clone(),
        }
    }
}

/// Product identifier (stock keeping unit).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sku(String);

impl Sku {
    /// Creates a SKU from a string.
    pub fn new(sku: impl Into<String>) -> Self {
        Self(sku.into())
    }

    /// Returns the SKU as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Sku {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Sku {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Sku {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Sku {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A line item in an order. The unit price is captured at order-creation
/// time and never updated from the catalog afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The product SKU.
    pub sku: Sku,

    /// Quantity ordered. Always greater than zero.
    pub quantity: u32,

    /// Price per unit, locked at order-creation time.
    pub unit_price: Money,
}

impl OrderItem {
    /// Creates a new order item.
    pub fn new(sku: impl Into<Sku>, quantity: u32, unit_price: Money) -> Self {
        Self {
            sku: sku.into(),
            quantity,
            unit_price,
        }
    }

    /// Returns the line total (`quantity × unit_price`). Exact in cents.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Human-readable order number shown to customers and support staff.
///
/// Derived deterministically from the order's aggregate ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Derives the order number from an aggregate ID.
    pub fn derive(order_id: AggregateId) -> Self {
        let simple = order_id.as_uuid().simple().to_string();
        Self(format!("ORD-{}", simple[..12].to_uppercase()))
    }

    /// Returns the order number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
