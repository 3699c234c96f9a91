//! Domain layer of the checkout engine.
//!
//! This crate provides:
//! - The [`Aggregate`] and [`DomainEvent`] traits plus the command handler
//!   that commits state changes as versioned event appends
//! - The [`Order`] aggregate with its lifecycle state machine
//! - The pure total calculator (money math, no I/O)
//! - The [`Payment`] aggregate tracking gateway state and refunds

pub mod aggregate;
pub mod command;
pub mod error;
pub mod order;
pub mod payment;

pub use aggregate::{Aggregate, DomainEvent};
pub use command::{CommandHandler, CommandResult};
pub use error::DomainError;
pub use order::{
    AttachPaymentIntent, AttachReservation, CancelOrder, ConfirmOrder, CreateOrder, CustomerId,
    MarkDelivered, MarkRefunded, MarkShipped, Order, OrderError, OrderEvent, OrderItem,
    OrderNumber, OrderService, OrderStatus, Purchaser, RecordPaymentRetry, SetAdminNote,
    ShippingRule, Sku, StartFulfillment, Totals, calculate_totals,
};
pub use payment::{
    CompletePayment, FailPayment, InitiatePayment, Payment, PaymentError, PaymentEvent,
    PaymentService, PaymentStatus, RefundRecord, RefundStatus, RequestRefund,
};
