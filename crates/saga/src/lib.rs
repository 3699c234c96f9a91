//! Checkout orchestration for the order lifecycle engine.
//!
//! The saga that turns a validated cart into a confirmed, paid,
//! inventory-backed order:
//!
//! 1. Compute totals (pure)
//! 2. Create the order in Draft
//! 3. Reserve inventory — all-or-nothing, released on any later failure
//! 4. Open a payment intent — compensated by release + cancel on failure
//! 5. Complete asynchronously via the signed gateway webhook
//!
//! Compensation ordering is deliberate: inventory is held before any money
//! moves because releasing a hold is free, while refunding a capture is
//! not.

pub mod bus;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod payments;
pub mod reservation;
pub mod retry;
pub mod services;
pub mod webhook;

pub use bus::{ConsumerLoop, EventBus, EventHandler, InMemoryEventBus, IntegrationEvent, topics};
pub use config::CheckoutConfig;
pub use error::{ErrorKind, Result, SagaError};
pub use orchestrator::{CheckoutAccepted, CheckoutOrchestrator, CheckoutRequest, WebhookOutcome};
pub use payments::{PaymentCoordinator, PaymentIntent, RefundOutcome};
pub use reservation::{HoldState, Reservation, ReservationCoordinator, ReservationGrant};
pub use retry::{CircuitBreaker, CircuitState, ExponentialBackoff, RetryPolicy};
pub use services::{
    GatewayIntent, GatewayRefund, InMemoryInvoiceGenerator, InMemoryNotificationSender,
    InMemoryPaymentGateway, InMemoryStockService, IntentRequest, InvoiceGenerator,
    NotificationSender, PaymentGateway, StockService,
};
pub use webhook::{
    InMemoryProcessedEvents, ProcessedEventStore, WebhookEvent, WebhookEventKind, WebhookVerifier,
};
