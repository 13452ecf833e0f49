//! Uniform JSON error responses.
//!
//! Handler failures are `(StatusCode, Json<ErrorBody>)` tuples with a
//! human-readable `error` message; validation failures add a `details`
//! list of per-field messages. Storage failures log the cause and answer
//! with a generic 500 so internal error text never reaches the client.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use tracing::error;

use storefront_core::DomainError;
use storefront_db::repositories::RepositoryError;
use storefront_db::CheckoutError;

pub type ApiError = (StatusCode, Json<ErrorBody>);

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

#[derive(Debug, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self { field: field.to_string(), message: message.into() }
    }
}

fn body(message: impl Into<String>) -> Json<ErrorBody> {
    Json(ErrorBody { error: message.into(), details: None })
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, body(message))
}

pub fn invalid_fields(message: impl Into<String>, details: Vec<FieldError>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorBody { error: message.into(), details: Some(details) }))
}

pub fn unauthorized(message: impl Into<String>) -> ApiError {
    (StatusCode::UNAUTHORIZED, body(message))
}

pub fn forbidden(message: impl Into<String>) -> ApiError {
    (StatusCode::FORBIDDEN, body(message))
}

pub fn not_found(message: impl Into<String>) -> ApiError {
    (StatusCode::NOT_FOUND, body(message))
}

pub fn conflict(message: impl Into<String>) -> ApiError {
    (StatusCode::CONFLICT, body(message))
}

pub fn db_error(error: sqlx::Error) -> ApiError {
    error!(error = %error, "database error while handling request");
    (StatusCode::INTERNAL_SERVER_ERROR, body("an internal error occurred"))
}

/// Repository failures: a vanished entity reads as 404, everything else is
/// logged and hidden behind a generic 500.
pub fn repository_error(error: RepositoryError) -> ApiError {
    match error {
        RepositoryError::NotFound(what) => not_found(format!("{what} not found")),
        other => {
            error!(error = %other, "repository error while handling request");
            (StatusCode::INTERNAL_SERVER_ERROR, body("an internal error occurred"))
        }
    }
}

/// Domain rule violations: broken state machines are conflicts, missing
/// lines are not found, the rest is invalid input.
pub fn domain_error(error: DomainError) -> ApiError {
    match &error {
        DomainError::InvalidOrderTransition { .. } => conflict(error.to_string()),
        DomainError::LineNotFound(_) => not_found(error.to_string()),
        _ => bad_request(error.to_string()),
    }
}

pub fn checkout_error(error: CheckoutError) -> ApiError {
    match error {
        CheckoutError::CartNotFound | CheckoutError::EmptyCart => {
            bad_request("cart is empty".to_string())
        }
        CheckoutError::InsufficientStock { name } => {
            bad_request(format!("insufficient stock for `{name}`"))
        }
        CheckoutError::OrderNotFound => not_found("order not found"),
        CheckoutError::NotCancellable => conflict("order is past the point of cancellation"),
        CheckoutError::Repository(inner) => repository_error(inner),
    }
}
