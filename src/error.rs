use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("invalid transition for {entity}: {from} -> {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    #[error("order {order} is not eligible: {reason}")]
    OrderNotEligible { order: String, reason: String },

    #[error("stop set mismatch: {0}")]
    StopSetMismatch(String),

    #[error("{route} is {status}, expected {expected}")]
    InvalidRouteState {
        route: String,
        status: String,
        expected: String,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid_transition(
        entity: impl Into<String>,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        AppError::InvalidTransition {
            entity: entity.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Label used for the `transitions_total` metric.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Validation { .. } => "validation",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::OrderNotEligible { .. } => "order_not_eligible",
            AppError::StopSetMismatch(_) => "stop_set_mismatch",
            AppError::InvalidRouteState { .. } => "invalid_route_state",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation { .. }
            | AppError::OrderNotEligible { .. }
            | AppError::StopSetMismatch(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidTransition { .. }
            | AppError::InvalidRouteState { .. }
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            AppError::Validation { field, message } => json!({ field.as_str(): [message] }),
            other => json!({ "detail": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
