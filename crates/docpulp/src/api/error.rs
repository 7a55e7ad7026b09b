//! API error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::types::ErrorResponse;
use crate::error::DocpulpError;

/// HTTP-mapped service error.
#[derive(Debug)]
pub struct ApiError {
    pub status_code: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    /// Request-level validation failure: no parsing was attempted.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            status_code: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                status: "INVALID_ARGUMENT".to_string(),
                error_message: message.into(),
            },
        }
    }

    /// Request-level fatal failure during extraction.
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status_code: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorResponse {
                status: "INTERNAL".to_string(),
                error_message: message.into(),
            },
        }
    }
}

impl From<DocpulpError> for ApiError {
    fn from(error: DocpulpError) -> Self {
        if error.is_validation() {
            Self::invalid_argument(error.to_string())
        } else {
            Self::internal(error.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code, Json(self.body)).into_response()
    }
}
