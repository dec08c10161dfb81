//! HTTP rendering of failures: `{"error": "..."}` with a matching status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use domains::DomainError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request body")]
    InvalidBody,

    #[error("Invalid comment ID")]
    InvalidId,

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidBody | ApiError::InvalidId => StatusCode::BAD_REQUEST,
            ApiError::Domain(DomainError::ValidationError(_)) => StatusCode::BAD_REQUEST,
            ApiError::Domain(DomainError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Domain(DomainError::RateLimitExceeded(_)) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Domain(DomainError::Internal(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Domain(err) => err.public_message(),
            other => other.to_string(),
        };
        (self.status(), Json(json!({ "error": message }))).into_response()
    }
}
