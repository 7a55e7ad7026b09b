//! Service client with env-derived endpoint, timeout and bounded retry.
//!
//! Retries cover transport-level failures only; any response from the
//! server, success or error, is final. Validation errors surface as
//! [`DocpulpError::Validation`], internal failures as
//! [`DocpulpError::Fatal`].

use std::path::Path;
use std::time::Duration;

use super::types::{ErrorResponse, HealthResponse, ParseResponse};
use crate::core::config::ClientConfig;
use crate::error::{DocpulpError, Result};
use crate::types::ParseOptions;

pub struct ParserClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl ParserClient {
    pub fn from_env() -> Result<Self> {
        Self::with_config(ClientConfig::from_env())
    }

    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DocpulpError::fatal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Parse a local file through the service.
    pub async fn parse_file(&self, path: &Path, options: &ParseOptions) -> Result<ParseResponse> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DocpulpError::validation("path has no file name"))?;
        self.parse_bytes(bytes, &file_name, options).await
    }

    /// Parse in-memory bytes through the service.
    pub async fn parse_bytes(&self, bytes: Vec<u8>, file_name: &str, options: &ParseOptions) -> Result<ParseResponse> {
        let url = format!("{}/parse", self.config.base_url());
        let options_json =
            serde_json::to_string(options).map_err(|e| DocpulpError::serialization(e.to_string()))?;

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
                tracing::warn!(attempt, "retrying parse request");
            }

            let form = reqwest::multipart::Form::new()
                .part(
                    "file",
                    reqwest::multipart::Part::bytes(bytes.clone()).file_name(file_name.to_string()),
                )
                .text("options", options_json.clone());

            match self.http.post(&url).multipart(form).send().await {
                Ok(response) => return handle_parse_response(response).await,
                Err(e) => {
                    last_error = Some(DocpulpError::fatal(format!("transport error: {e}")));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DocpulpError::fatal("request failed with no attempts".to_string())))
    }

    /// Probe service health.
    pub async fn health_check(&self) -> Result<String> {
        let url = format!("{}/health", self.config.base_url());
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| DocpulpError::fatal(format!("transport error: {e}")))?;
        let health: HealthResponse = response
            .json()
            .await
            .map_err(|e| DocpulpError::serialization(format!("malformed health response: {e}")))?;
        Ok(health.status)
    }
}

async fn handle_parse_response(response: reqwest::Response) -> Result<ParseResponse> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| DocpulpError::serialization(format!("malformed parse response: {e}")));
    }

    let error: ErrorResponse = response.json().await.unwrap_or(ErrorResponse {
        status: "INTERNAL".to_string(),
        error_message: format!("server returned HTTP {status}"),
    });

    if error.status == "INVALID_ARGUMENT" {
        Err(DocpulpError::validation(error.error_message))
    } else {
        Err(DocpulpError::fatal(error.error_message))
    }
}
