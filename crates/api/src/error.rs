//! API error type and its HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tipline_subscriptions::{ErrorKind, SubscriptionError};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            ApiError::Subscription(e) => match e.kind() {
                ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
                ErrorKind::AlreadyResolved => (StatusCode::CONFLICT, "already_resolved"),
                ErrorKind::Conflict => (StatusCode::CONFLICT, "conflict"),
                ErrorKind::Invalid => (StatusCode::BAD_REQUEST, "invalid"),
                ErrorKind::Unauthorized => (StatusCode::FORBIDDEN, "forbidden"),
                ErrorKind::StoreUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Internal details stay in the logs
        let message = if status.is_server_error() {
            tracing::error!(error = %self, code, "Request failed");
            match status {
                StatusCode::SERVICE_UNAVAILABLE => "Service temporarily unavailable".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            tracing::debug!(error = %self, code, "Request rejected");
            self.to_string()
        };

        let body = Json(json!({
            "success": false,
            "error": message,
            "code": code,
        }));
        (status, body).into_response()
    }
}
