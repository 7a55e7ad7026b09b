//! API server setup: routing, limits, startup prewarm and graceful
//! shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{health_handler, parse_handler};
use super::types::ApiState;
use crate::core::config::{ServerConfig, MAX_MESSAGE_BYTES, SHUTDOWN_GRACE};
use crate::error::{DocpulpError, Result};
use crate::ocr::{get_ocr_pool, shutdown_ocr_pool, OcrService};

/// Build the router. Public so embedders can mount it themselves.
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/parse", post(parse_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(MAX_MESSAGE_BYTES))
        .layer(RequestBodyLimitLayer::new(MAX_MESSAGE_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the server with environment configuration and the global OCR
/// pool. Blocks until SIGTERM/ctrl-c, then drains and tears the pool down.
pub async fn serve(config: ServerConfig) -> Result<()> {
    let pool = get_ocr_pool()?;

    if config.preload_ocr {
        match pool.prewarm().await {
            Ok(()) => tracing::info!("OCR pool prewarmed at startup"),
            Err(e) => tracing::warn!(error = %e, "OCR prewarm failed; first request pays model load"),
        }
    }

    let ocr: Arc<dyn OcrService> = pool;
    serve_with_state(config, ApiState { ocr }).await
}

/// Start the server with explicit state (tests inject a stub OCR service
/// here).
pub async fn serve_with_state(config: ServerConfig, state: ApiState) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| DocpulpError::fatal(format!("failed to bind {addr}: {e}")))?;

    tracing::info!(
        port = config.port,
        max_workers = config.max_workers,
        max_message_mb = MAX_MESSAGE_BYTES / (1024 * 1024),
        "parser service listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| DocpulpError::fatal(format!("server error: {e}")))?;

    tracing::info!(grace_s = SHUTDOWN_GRACE.as_secs(), "draining and shutting down");
    tokio::time::timeout(SHUTDOWN_GRACE, shutdown_ocr_pool())
        .await
        .unwrap_or_else(|_| tracing::warn!("OCR pool drain exceeded the grace period"));

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
