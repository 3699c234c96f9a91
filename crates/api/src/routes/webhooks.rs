//! Gateway webhook endpoint.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use event_store::EventStore;
use saga::WebhookOutcome;
use serde::Serialize;

use crate::error::ApiError;
use crate::routes::orders::AppState;

/// Header carrying the hex-encoded HMAC-SHA256 of the raw body.
pub const SIGNATURE_HEADER: &str = "webhook-signature";

#[derive(Serialize)]
pub struct WebhookResponse {
    pub outcome: &'static str,
}

/// POST /webhooks/payment — signed gateway callback.
///
/// The raw body is verified before parsing; a missing or invalid
/// signature is rejected with 401 and no state is touched.
#[tracing::instrument(skip(state, headers, body))]
pub async fn payment<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Saga(saga::SagaError::InvalidSignature))?;

    let outcome = state
        .orchestrator
        .handle_payment_webhook(&body, signature)
        .await?;

    Ok(Json(WebhookResponse {
        outcome: match outcome {
            WebhookOutcome::Processed => "processed",
            WebhookOutcome::Replayed => "replayed",
        },
    }))
}
