//! API error surface
//!
//! Machine-readable error codes for the order REST endpoints, mapped from
//! the domain errors the core produces.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use persistence::StoreError;
use settlement::AdmissionError;

/// Central error type for the gateway.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid order type: {0}")]
    InvalidOrderType(String),

    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("insufficient shares: {0}")]
    InsufficientShares(String),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("order cannot be cancelled: {0}")]
    CannotCancel(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::InvalidOrderType(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_ORDER_TYPE", msg)
            }
            ApiError::InsufficientBalance(msg) => {
                (StatusCode::BAD_REQUEST, "INSUFFICIENT_BALANCE", msg)
            }
            ApiError::InsufficientShares(msg) => {
                (StatusCode::BAD_REQUEST, "INSUFFICIENT_SHARES", msg)
            }
            ApiError::OrderNotFound(msg) => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND", msg),
            ApiError::CannotCancel(msg) => (StatusCode::CONFLICT, "CANNOT_CANCEL", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": code,
            "message": message
        }));

        (status, body).into_response()
    }
}

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::InvalidOrderType(msg) => ApiError::InvalidOrderType(msg),
            AdmissionError::InvalidQuantity(msg) => {
                ApiError::InvalidOrderType(format!("invalid quantity: {msg}"))
            }
            AdmissionError::InsufficientBalance {
                required,
                available,
            } => ApiError::InsufficientBalance(format!(
                "required {required}, available {available}"
            )),
            AdmissionError::InsufficientShares { requested, held } => {
                ApiError::InsufficientShares(format!("requested {requested}, held {held}"))
            }
            AdmissionError::Unauthorized => {
                ApiError::Unauthorized("account does not belong to user".to_string())
            }
            AdmissionError::Store(err) => ApiError::Internal(anyhow::anyhow!(err)),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind: "order", id } => ApiError::OrderNotFound(id),
            other => ApiError::Internal(anyhow::anyhow!(other)),
        }
    }
}
