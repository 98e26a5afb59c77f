//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, OrderError};
use payments::ReconcileError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Order lifecycle error.
    Domain(DomainError),
    /// Payment webhook error.
    Reconcile(ReconcileError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Reconcile(err) => reconcile_error_to_response(err),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::MissingOrderId => StatusCode::BAD_REQUEST,
        DomainError::Order(order_err) => match order_err {
            OrderError::EmptyOrder
            | OrderError::InvalidQuantity { .. }
            | OrderError::UnknownStatus(_)
            | OrderError::TotalOutOfRange => StatusCode::BAD_REQUEST,
            OrderError::InvalidTransition { .. } => StatusCode::CONFLICT,
            OrderError::DiscountExceedsPrice { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        },
        DomainError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        DomainError::Forbidden => StatusCode::FORBIDDEN,
        DomainError::InsufficientStock { .. } => StatusCode::CONFLICT,
        DomainError::VariantLookupFailed(_)
        | DomainError::DataIntegrity(_)
        | DomainError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    (domain_error_status(&err), err.to_string())
}

fn reconcile_error_to_response(err: ReconcileError) -> (StatusCode, String) {
    match err {
        ReconcileError::MalformedEvent(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        ReconcileError::Domain(err) => domain_error_to_response(err),
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Domain(err.into())
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        ApiError::Reconcile(err)
    }
}
