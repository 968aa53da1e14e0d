//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fulfillment::FulfillmentError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Order fulfillment failure.
    Fulfillment(FulfillmentError),
    /// Store failure outside fulfillment.
    Store(StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Fulfillment(err) => fulfillment_error_to_response(err),
            ApiError::Store(err) => store_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn fulfillment_error_to_response(err: FulfillmentError) -> (StatusCode, String) {
    match &err {
        FulfillmentError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        FulfillmentError::ProductNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        FulfillmentError::InsufficientStock(_) => (StatusCode::CONFLICT, err.to_string()),
        FulfillmentError::Storage(_) => {
            tracing::error!(error = %err, "storage failure during order placement");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, String) {
    match &err {
        StoreError::DuplicateSku(_) | StoreError::ProductReferenced(_) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        StoreError::Database(_) | StoreError::Migration(_) => {
            tracing::error!(error = %err, "database error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        ApiError::Fulfillment(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}
