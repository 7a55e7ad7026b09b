//! API request/response types.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ocr::OcrService;
use crate::types::ParseMetadata;

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    /// The OCR tier used by every request (the process-wide pool in
    /// production, a stub in tests).
    pub ocr: Arc<dyn OcrService>,
}

/// Successful parse response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResponse {
    pub content: String,
    pub metadata: ParseMetadata,
    /// Empty on success; set alongside an error status otherwise.
    pub error_message: String,
}

/// Error body carrying the status name of the failure class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// `INVALID_ARGUMENT` or `INTERNAL`.
    pub status: String,
    pub error_message: String,
}

/// Health probe response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `SERVING` while the server is up.
    pub status: String,
}
