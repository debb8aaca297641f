//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`cq_core::Error`] so that route handlers
//! can return `Result<T, AppError>` directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
pub struct AppError(pub cq_core::Error);

impl From<cq_core::Error> for AppError {
    fn from(e: cq_core::Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.0, "Server error in API handler");
        }

        let code = match &self.0 {
            cq_core::Error::InputNotFound { .. } => "input_not_found",
            cq_core::Error::MetadataExtraction { .. } => "metadata_error",
            cq_core::Error::Engine(_) => "engine_error",
            cq_core::Error::Resolution(_) => "resolution_error",
            cq_core::Error::Tool { .. } => "tool_error",
            cq_core::Error::Io { .. } => "io_error",
            cq_core::Error::Config(_) => "config_error",
            cq_core::Error::Validation(_) => "validation_error",
            cq_core::Error::Internal(_) => "internal_error",
        };

        let body = json!({
            "error": self.0.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
