//! External collaborator traits and in-memory test doubles.

pub mod gateway;
pub mod invoice;
pub mod notify;
pub mod stock;

pub use gateway::{
    GatewayIntent, GatewayRefund, InMemoryPaymentGateway, IntentRequest, PaymentGateway,
};
pub use invoice::{InMemoryInvoiceGenerator, InvoiceGenerator};
pub use notify::{InMemoryNotificationSender, NotificationSender};
pub use stock::{InMemoryStockService, StockService};
