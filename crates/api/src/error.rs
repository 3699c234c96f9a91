//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::{ErrorKind, SagaError};

/// API-level error that maps the saga taxonomy onto HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Orchestration error, mapped by its kind.
    Saga(SagaError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, retryable) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Saga(err) => saga_error_to_response(err),
        };

        let mut body = serde_json::json!({ "error": message });
        if let Some(retryable) = retryable {
            body["retryable"] = serde_json::json!(retryable);
        }
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String, Option<bool>) {
    let status = match err.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::StateConflict => StatusCode::CONFLICT,
        ErrorKind::BusinessRule => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Security => StatusCode::UNAUTHORIZED,
        ErrorKind::ExternalService => match err {
            SagaError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        },
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Internal => {
            tracing::error!(error = %err, "internal server error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    // Stock failures are retryable from the customer's point of view once
    // inventory returns; payment retryability is reported by the webhook
    // flow through the order's retry counter.
    let retryable = match &err {
        SagaError::OutOfStock { .. } => Some(false),
        SagaError::ExternalService { .. } | SagaError::CircuitOpen { .. } => Some(true),
        _ => None,
    };

    (status, err.to_string(), retryable)
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::AggregateId;

    fn status_of(err: SagaError) -> StatusCode {
        saga_error_to_response(err).0
    }

    #[test]
    fn taxonomy_maps_to_status_codes() {
        assert_eq!(
            status_of(SagaError::Validation("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(SagaError::OutOfStock {
                skus: vec!["SKU-A".into()]
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(SagaError::InvalidSignature),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(SagaError::CircuitOpen { service: "stock" }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(SagaError::ExternalService {
                service: "gateway",
                reason: "down".into()
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(SagaError::OrderNotFound(AggregateId::new())),
            StatusCode::NOT_FOUND
        );
    }
}
