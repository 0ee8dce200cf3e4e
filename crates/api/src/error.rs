//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use message_bus::BusError;
use saga::SagaError;
use thiserror::Error;

/// Errors raised while assembling or starting the kitchen.
#[derive(Debug, Error)]
pub enum KitchenError {
    /// Bus component error.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// Saga configuration error.
    #[error("Saga error: {0}")]
    Saga(#[from] SagaError),
}

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    match &err {
        DomainError::UnknownOrder(_) => (StatusCode::NOT_FOUND, err.to_string()),
        DomainError::AlreadyPaid(_) | DomainError::DuplicateOrder(_) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        DomainError::UnexpectedMessage { .. } => {
            tracing::error!(error = %err, "unexpected message reached a stage");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<KitchenError> for ApiError {
    fn from(err: KitchenError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
