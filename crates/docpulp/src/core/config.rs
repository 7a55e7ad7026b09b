//! Environment-driven service configuration.
//!
//! Every knob has a `PARSER_*` environment variable and a default that
//! matches a stock deployment. Unparseable values fall back to the default
//! with a warning rather than failing startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Per-page extraction deadline on the page pool.
pub const PAGE_TASK_TIMEOUT: Duration = Duration::from_secs(300);

/// Per-image recognition deadline on the OCR pool. Generous because the
/// first request on a fresh worker also pays model-load latency.
pub const OCR_TASK_TIMEOUT: Duration = Duration::from_secs(180);

/// Maximum request/response body size on the facade, both directions.
pub const MAX_MESSAGE_BYTES: usize = 50 * 1024 * 1024;

/// Grace period for draining in-flight requests on shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn env_parse<T: FromStr>(key: &str, default: T) -> T
where
    T: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("invalid {key}={raw:?}, using default {default}");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Facade server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen port (`PARSER_GRPC_PORT`, default 50051).
    pub port: u16,
    /// Runtime worker threads serving requests (`PARSER_GRPC_MAX_WORKERS`,
    /// default 10).
    pub max_workers: usize,
    /// Prewarm the OCR pool at startup (`PARSER_GRPC_PRELOAD_OCR`, default
    /// true).
    pub preload_ocr: bool,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PARSER_GRPC_PORT", 50051),
            max_workers: env_parse("PARSER_GRPC_MAX_WORKERS", 10).max(1),
            preload_ocr: env_bool("PARSER_GRPC_PRELOAD_OCR", true),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 50051,
            max_workers: 10,
            preload_ocr: true,
        }
    }
}

/// Page-pool sizing.
#[derive(Debug, Clone)]
pub struct PagePoolConfig {
    /// Explicit pool size; 0 selects auto sizing
    /// (`PARSER_PAGE_POOL_MAX_WORKERS`).
    pub max_workers: usize,
    /// Cores withheld from the page pool to protect the OCR tier
    /// (`PARSER_PAGE_POOL_RESERVED_CORES`, default 2).
    pub reserved_cores: usize,
    /// Upper cap on the auto-sized pool (`PARSER_PAGE_POOL_MAX_LIMIT`,
    /// default 32).
    pub max_limit: usize,
}

impl PagePoolConfig {
    pub fn from_env() -> Self {
        Self {
            max_workers: env_parse("PARSER_PAGE_POOL_MAX_WORKERS", 0usize),
            reserved_cores: env_parse("PARSER_PAGE_POOL_RESERVED_CORES", 2usize),
            max_limit: env_parse("PARSER_PAGE_POOL_MAX_LIMIT", 32usize),
        }
    }

    /// Effective worker count, never below 1.
    pub fn size(&self) -> usize {
        if self.max_workers > 0 {
            return self.max_workers;
        }
        let cpus = num_cpus::get();
        cpus.saturating_sub(self.reserved_cores).min(self.max_limit).max(1)
    }
}

impl Default for PagePoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 0,
            reserved_cores: 2,
            max_limit: 32,
        }
    }
}

/// OCR-pool sizing and model location.
#[derive(Debug, Clone)]
pub struct OcrPoolConfig {
    /// Explicit worker count; 0 selects `min(cpu_count, 5)`
    /// (`PARSER_OCR_POOL_MAX_WORKERS`). Each worker holds a full model copy
    /// (~500 MiB resident), so the cap stays small.
    pub max_workers: usize,
    /// Directory containing `text-detection.rten` and
    /// `text-recognition.rten` (`PARSER_OCR_MODEL_DIR`).
    pub model_dir: PathBuf,
}

impl OcrPoolConfig {
    pub fn from_env() -> Self {
        Self {
            max_workers: env_parse("PARSER_OCR_POOL_MAX_WORKERS", 0usize),
            model_dir: std::env::var("PARSER_OCR_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_model_dir()),
        }
    }

    pub fn size(&self) -> usize {
        if self.max_workers > 0 {
            return self.max_workers;
        }
        num_cpus::get().min(5).max(1)
    }
}

impl Default for OcrPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 0,
            model_dir: default_model_dir(),
        }
    }
}

fn default_model_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".cache").join("docpulp").join("ocrs")
}

/// Client-side settings for [`crate::api::client::ParserClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `PARSER_GRPC_HOST`, default localhost.
    pub host: String,
    /// `PARSER_GRPC_PORT`, default 50051.
    pub port: u16,
    /// Request timeout in seconds (`PARSER_GRPC_TIMEOUT`, default 300).
    pub timeout: Duration,
    /// Retries on transport errors (`PARSER_GRPC_MAX_RETRIES`, default 3).
    pub max_retries: u32,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("PARSER_GRPC_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env_parse("PARSER_GRPC_PORT", 50051),
            timeout: Duration::from_secs(env_parse("PARSER_GRPC_TIMEOUT", 300u64)),
            max_retries: env_parse("PARSER_GRPC_MAX_RETRIES", 3u32),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 50051,
            timeout: Duration::from_secs(300),
            max_retries: 3,
        }
    }
}

/// Log sink settings, consumed by the CLI when installing the subscriber.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// `PARSER_LOG_DIR`, default `./logs`.
    pub dir: PathBuf,
    /// `PARSER_LOG_FILE`, default `parser.log`.
    pub file: String,
    /// `PARSER_LOG_LEVEL`, default `INFO`.
    pub level: String,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self {
            dir: std::env::var("PARSER_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./logs")),
            file: std::env::var("PARSER_LOG_FILE").unwrap_or_else(|_| "parser.log".to_string()),
            level: std::env::var("PARSER_LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
        }
    }
}
