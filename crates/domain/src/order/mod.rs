//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;
mod state;
pub mod totals;
mod value_objects;

pub use aggregate::Order;
pub use commands::*;
pub use events::{
    AdminNoteSetData, FulfillmentStartedData, OrderCancelledData, OrderConfirmedData,
    OrderCreatedData, OrderDeliveredData, OrderEvent, OrderRefundedData, OrderShippedData,
    PaymentIntentAttachedData, PaymentRetryRecordedData, ReservationAttachedData,
};
pub use service::OrderService;
pub use state::OrderStatus;
pub use totals::{ShippingRule, Totals, calculate_totals};
pub use value_objects::{CustomerId, OrderItem, OrderNumber, Purchaser, Sku};

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The requested lifecycle transition is not in the transition table.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The operation requires a specific status.
    #[error("order is {actual}, expected {expected}")]
    UnexpectedStatus {
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// The order aggregate does not exist yet.
    #[error("order does not exist")]
    NotCreated,

    /// The order was already created.
    #[error("order already created")]
    AlreadyCreated,

    /// A cart with no line items cannot become an order.
    #[error("order has no line items")]
    EmptyOrder,

    /// Line item quantity must be greater than zero.
    #[error("invalid quantity {quantity} for {sku}")]
    InvalidQuantity { sku: String, quantity: u32 },

    /// Line item unit price must be positive.
    #[error("invalid unit price {price} for {sku}")]
    InvalidUnitPrice { sku: String, price: i64 },

    /// Guest email failed validation.
    #[error("invalid guest email: {email}")]
    InvalidGuestEmail { email: String },

    /// The totals violate `total == subtotal + tax + shipping - discount`.
    #[error("totals are inconsistent")]
    InconsistentTotals,

    /// Discount must not be negative.
    #[error("invalid discount: {discount}")]
    InvalidDiscount { discount: i64 },

    /// Discount must not exceed the order value.
    #[error("discount {discount} exceeds order value {gross}")]
    DiscountExceedsOrderValue { discount: i64, gross: i64 },
}
