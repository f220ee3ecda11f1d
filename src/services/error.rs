//! Error handling for route handlers.
//!
//! Every pre-stream failure surfaces as a JSON body: line-level validation
//! failures as `{"errors": [...]}`, everything else as `{"error": "..."}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Caller-fixable problem with the submission itself.
    #[error("invalid request: {0}")]
    BadRequest(String),
    /// Line-level URL validation failures; the batch never starts.
    #[error("invalid tweet URLs")]
    Validation(Vec<String>),
    /// Parse, credential, media upload, or store failure.
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Validation(errors) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response()
            }
            ApiError::Internal(message) => {
                error!(error = %message, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": message })),
                )
                    .into_response()
            }
        }
    }
}
