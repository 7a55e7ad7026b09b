//! API request handlers.

use std::time::Instant;

use axum::extract::{Multipart, State};
use axum::Json;
use uuid::Uuid;

use super::error::ApiError;
use super::types::{ApiState, HealthResponse, ParseResponse};
use crate::core::orchestrator::parse_bytes;
use crate::types::{DocumentFormat, ParseOptions};

/// Parse endpoint.
///
/// POST /parse, multipart form data:
/// - `file`: the document bytes, with the original file name
/// - `options` (optional): JSON [`ParseOptions`]
///
/// Validation failures return 400 with `INVALID_ARGUMENT` before any work
/// is attempted; extraction failures return 500 with `INTERNAL`.
pub async fn parse_handler(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<Json<ParseResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let started = Instant::now();

    let mut file_bytes: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut options = ParseOptions::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::invalid_argument(format!("malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::invalid_argument(format!("failed to read file field: {e}")))?;
                file_bytes = Some(data.to_vec());
            }
            "options" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::invalid_argument(format!("failed to read options field: {e}")))?;
                options = serde_json::from_str(&raw)
                    .map_err(|e| ApiError::invalid_argument(format!("invalid options: {e}")))?;
            }
            _ => {}
        }
    }

    let file_bytes = match file_bytes {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => {
            tracing::error!(%request_id, "validation failed: file_content is empty");
            return Err(ApiError::invalid_argument("file_content must not be empty"));
        }
    };
    let file_name = match file_name {
        Some(name) if !name.is_empty() => name,
        _ => {
            tracing::error!(%request_id, "validation failed: file_name is empty");
            return Err(ApiError::invalid_argument("file_name must not be empty"));
        }
    };
    if DocumentFormat::from_file_name(&file_name).is_none() {
        tracing::error!(%request_id, %file_name, "validation failed: unrecognized extension");
        return Err(ApiError::invalid_argument(format!(
            "unrecognized file extension: {file_name}"
        )));
    }

    tracing::info!(%request_id, %file_name, size = file_bytes.len(), "parse request received");

    let result = parse_bytes(&file_bytes, &file_name, &options, state.ocr.clone()).await;
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

    match result {
        Ok(mut parsed) => {
            // The facade wall clock is authoritative for parse_time_ms.
            parsed.metadata.parse_time_ms = duration_ms;
            tracing::info!(
                %request_id,
                %file_name,
                duration_ms,
                pages = parsed.metadata.page_count,
                images = parsed.metadata.image_count,
                tables = parsed.metadata.table_count,
                ocr = parsed.metadata.ocr_count,
                "parse request complete"
            );
            Ok(Json(ParseResponse {
                content: parsed.content,
                metadata: parsed.metadata,
                error_message: String::new(),
            }))
        }
        Err(e) => {
            tracing::error!(%request_id, %file_name, duration_ms, error = %e, "parse request failed");
            Err(e.into())
        }
    }
}

/// Health probe.
///
/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "SERVING".to_string(),
    })
}
