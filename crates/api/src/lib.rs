//! HTTP surface of the checkout engine.
//!
//! Exposes checkout, order status, cancellation, admin refunds,
//! fulfillment transitions, and the signed gateway webhook, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    CheckoutOrchestrator, InMemoryEventBus, InMemoryInvoiceGenerator, InMemoryNotificationSender,
    InMemoryPaymentGateway, InMemoryProcessedEvents, InMemoryStockService, WebhookVerifier,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/checkout", post(routes::orders::checkout::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route("/orders/{id}/refund", post(routes::orders::refund::<S>))
        .route(
            "/orders/{id}/fulfillment",
            post(routes::orders::start_fulfillment::<S>),
        )
        .route("/orders/{id}/ship", post(routes::orders::ship::<S>))
        .route("/orders/{id}/deliver", post(routes::orders::deliver::<S>))
        .route("/webhooks/payment", post(routes::webhooks::payment::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Collaborator handles kept alongside the default state so tests and the
/// binary can inspect or seed them.
pub struct Collaborators {
    pub stock: InMemoryStockService,
    pub gateway: InMemoryPaymentGateway,
    pub invoices: Arc<InMemoryInvoiceGenerator>,
    pub notifier: Arc<InMemoryNotificationSender>,
    pub bus: Arc<InMemoryEventBus>,
    pub verifier: WebhookVerifier,
}

/// Creates application state wired with in-memory collaborators.
pub fn create_default_state<S: EventStore + Clone + 'static>(
    event_store: S,
    config: &Config,
) -> (Arc<AppState<S>>, Collaborators) {
    let stock = InMemoryStockService::new();
    let gateway = InMemoryPaymentGateway::new();
    let invoices = Arc::new(InMemoryInvoiceGenerator::new());
    let notifier = Arc::new(InMemoryNotificationSender::new());
    let bus = Arc::new(InMemoryEventBus::new());
    let verifier = WebhookVerifier::new(config.webhook_secret.as_bytes().to_vec());
    let processed = Arc::new(InMemoryProcessedEvents::new());

    let orchestrator = CheckoutOrchestrator::new(
        event_store,
        stock.clone(),
        gateway.clone(),
        invoices.clone(),
        notifier.clone(),
        bus.clone(),
        verifier.clone(),
        processed,
        config.checkout_config(),
    );

    let state = Arc::new(AppState { orchestrator });
    let collaborators = Collaborators {
        stock,
        gateway,
        invoices,
        notifier,
        bus,
        verifier,
    };

    (state, collaborators)
}
