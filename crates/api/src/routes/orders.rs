//! Checkout, order status, cancellation, refund, and fulfillment
//! endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{AggregateId, Money};
use domain::{Order, OrderItem, Purchaser};
use event_store::EventStore;
use saga::{
    CheckoutOrchestrator, CheckoutRequest, InMemoryPaymentGateway, InMemoryStockService,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: EventStore + Clone> {
    pub orchestrator:
        CheckoutOrchestrator<S, InMemoryStockService, InMemoryPaymentGateway>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CheckoutBody {
    /// Authenticated customer id. Mutually exclusive with `guest_email`.
    pub customer_id: Option<String>,
    /// Guest email. Mutually exclusive with `customer_id`.
    pub guest_email: Option<String>,
    pub items: Vec<CheckoutItem>,
    #[serde(default)]
    pub discount_cents: i64,
}

#[derive(Deserialize)]
pub struct CheckoutItem {
    pub sku: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Deserialize)]
pub struct CancelBody {
    pub cancelled_by: Option<String>,
}

#[derive(Deserialize)]
pub struct RefundBody {
    pub amount_cents: i64,
}

#[derive(Deserialize)]
pub struct ShipBody {
    pub tracking_number: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct TotalsResponse {
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
}

#[derive(Serialize)]
pub struct IntentResponse {
    pub intent_id: String,
    pub client_secret: String,
    pub amount_cents: i64,
    pub currency: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub order_id: String,
    pub order_number: String,
    pub totals: TotalsResponse,
    pub payment: IntentResponse,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub sku: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub status: String,
    pub items: Vec<OrderItemResponse>,
    pub totals: TotalsResponse,
    pub payment_intent_id: Option<String>,
    pub reservation_ref: Option<String>,
    pub retry_count: u32,
    pub admin_note: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub order_id: String,
    pub status: String,
}

#[derive(Serialize)]
pub struct RefundResponse {
    pub refund_id: String,
    pub refunded_cents: i64,
    pub fully_refunded: bool,
}

// -- Handlers --

/// POST /checkout — run the checkout saga for a validated cart.
#[tracing::instrument(skip(state, body))]
pub async fn checkout<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<CheckoutBody>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let purchaser = parse_purchaser(&body)?;
    let items: Vec<OrderItem> = body
        .items
        .iter()
        .map(|item| {
            OrderItem::new(
                item.sku.as_str(),
                item.quantity,
                Money::from_cents(item.unit_price_cents),
            )
        })
        .collect();

    let accepted = state
        .orchestrator
        .checkout(CheckoutRequest {
            purchaser,
            items,
            discount: Money::from_cents(body.discount_cents),
        })
        .await?;

    let response = CheckoutResponse {
        order_id: accepted.order_id.to_string(),
        order_number: accepted.order_number,
        totals: totals_response(&accepted.totals),
        payment: IntentResponse {
            intent_id: accepted.intent.intent_id,
            client_secret: accepted.intent.client_secret,
            amount_cents: accepted.intent.amount.cents(),
            currency: accepted.intent.currency.code().to_string(),
            expires_at: accepted.intent.expires_at,
        },
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /orders/{id} — current order state.
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .orchestrator
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("order {id} not found")))?;

    Ok(Json(order_response(order_id, &order)))
}

/// POST /orders/{id}/cancel — customer-initiated cancellation.
#[tracing::instrument(skip(state, body))]
pub async fn cancel<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(body): Json<CancelBody>,
) -> Result<Json<StatusResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    state
        .orchestrator
        .cancel_order(order_id, body.cancelled_by)
        .await?;

    Ok(Json(StatusResponse {
        order_id: id,
        status: "Cancelled".to_string(),
    }))
}

/// POST /orders/{id}/refund — admin refund against the captured payment.
#[tracing::instrument(skip(state, body))]
pub async fn refund<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(body): Json<RefundBody>,
) -> Result<Json<RefundResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let outcome = state
        .orchestrator
        .admin_refund(order_id, Money::from_cents(body.amount_cents))
        .await?;

    Ok(Json(RefundResponse {
        refund_id: outcome.refund_id,
        refunded_cents: outcome.refunded_amount.cents(),
        fully_refunded: outcome.fully_refunded,
    }))
}

/// POST /orders/{id}/fulfillment — start pick/pack.
#[tracing::instrument(skip(state))]
pub async fn start_fulfillment<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.orchestrator.start_fulfillment(order_id).await?;

    Ok(Json(StatusResponse {
        order_id: id,
        status: order.status().to_string(),
    }))
}

/// POST /orders/{id}/ship — hand to carrier.
#[tracing::instrument(skip(state, body))]
pub async fn ship<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(body): Json<ShipBody>,
) -> Result<Json<StatusResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .orchestrator
        .mark_shipped(order_id, body.tracking_number)
        .await?;

    Ok(Json(StatusResponse {
        order_id: id,
        status: order.status().to_string(),
    }))
}

/// POST /orders/{id}/deliver — confirm delivery.
#[tracing::instrument(skip(state))]
pub async fn deliver<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.orchestrator.mark_delivered(order_id).await?;

    Ok(Json(StatusResponse {
        order_id: id,
        status: order.status().to_string(),
    }))
}

// -- Helpers --

fn parse_order_id(id: &str) -> Result<AggregateId, ApiError> {
    AggregateId::parse_str(id).map_err(|_| ApiError::BadRequest(format!("invalid order id: {id}")))
}

fn parse_purchaser(body: &CheckoutBody) -> Result<Purchaser, ApiError> {
    match (&body.customer_id, &body.guest_email) {
        (Some(_), Some(_)) => Err(ApiError::BadRequest(
            "customer_id and guest_email are mutually exclusive".to_string(),
        )),
        (Some(customer), None) => {
            let uuid = uuid::Uuid::parse_str(customer)
                .map_err(|e| ApiError::BadRequest(format!("invalid customer_id: {e}")))?;
            Ok(Purchaser::Customer(domain::CustomerId::from_uuid(uuid)))
        }
        (None, Some(email)) => Purchaser::guest(email.as_str())
            .map_err(|e| ApiError::BadRequest(e.to_string())),
        (None, None) => Err(ApiError::BadRequest(
            "either customer_id or guest_email is required".to_string(),
        )),
    }
}

fn totals_response(totals: &domain::Totals) -> TotalsResponse {
    TotalsResponse {
        subtotal_cents: totals.subtotal.cents(),
        tax_cents: totals.tax.cents(),
        shipping_cents: totals.shipping.cents(),
        discount_cents: totals.discount.cents(),
        total_cents: totals.total.cents(),
    }
}

fn order_response(order_id: AggregateId, order: &Order) -> OrderResponse {
    let totals = order.totals();
    OrderResponse {
        id: order_id.to_string(),
        order_number: order
            .order_number()
            .map(|n| n.to_string())
            .unwrap_or_default(),
        status: order.status().to_string(),
        items: order
            .items()
            .iter()
            .map(|item| OrderItemResponse {
                sku: item.sku.to_string(),
                quantity: item.quantity,
                unit_price_cents: item.unit_price.cents(),
            })
            .collect(),
        totals: totals_response(&totals),
        payment_intent_id: order.payment_intent_id().map(str::to_string),
        reservation_ref: order.reservation_ref().map(str::to_string),
        retry_count: order.retry_count(),
        admin_note: order.admin_note().map(str::to_string),
        created_at: order.created_at(),
        updated_at: order.updated_at(),
    }
}
