//! docpulp service binary.
//!
//! Subcommands:
//! - `serve`: run the parser service (default when no command is given)
//! - `extract`: parse one local file and print the artifact
//! - `ocr-worker` (hidden): entry point for OCR pool worker processes
//!
//! # Configuration
//!
//! Everything is environment-driven (`PARSER_*` variables); see the
//! `docpulp` crate's config module for the full table. Logs go to the file
//! sink under `PARSER_LOG_DIR`/`PARSER_LOG_FILE` and to stderr, at
//! `PARSER_LOG_LEVEL`.
//!
//! # Exit codes
//!
//! 0 on success; non-zero on bind failure or fatal startup error.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docpulp::core::config::{LogConfig, ServerConfig};
use docpulp::core::orchestrator::parse_file;
use docpulp::types::ParseOptions;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// docpulp document-ingestion service
#[derive(Parser)]
#[command(name = "docpulp")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the parser service
    Serve {
        /// Listen port (overrides PARSER_GRPC_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Parse a single document locally and print the result
    Extract {
        /// Path to the document
        path: PathBuf,

        /// Disable OCR on embedded images
        #[arg(long)]
        no_ocr: bool,

        /// Print the full JSON response instead of the text artifact
        #[arg(long)]
        json: bool,
    },

    /// OCR worker process entry point (spawned by the pool)
    #[command(hide = true, name = "ocr-worker")]
    OcrWorker,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve { port: None });

    match command {
        Commands::OcrWorker => {
            // Workers log to stderr only; stdout carries the framed
            // protocol.
            init_stderr_logging()?;
            docpulp::ocr::run_ocr_worker().context("OCR worker failed")?;
            Ok(())
        }
        Commands::Extract { path, no_ocr, json } => {
            init_logging()?;
            let runtime = build_runtime(ServerConfig::from_env().max_workers)?;
            runtime.block_on(run_extract(path, no_ocr, json))
        }
        Commands::Serve { port } => {
            init_logging()?;
            let mut config = ServerConfig::from_env();
            if let Some(port) = port {
                config.port = port;
            }
            let runtime = build_runtime(config.max_workers)?;
            runtime.block_on(docpulp::api::serve(config)).context("server failed")?;
            Ok(())
        }
    }
}

fn build_runtime(worker_threads: usize) -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads.max(1))
        .enable_all()
        .build()
        .context("failed to build async runtime")
}

async fn run_extract(path: PathBuf, no_ocr: bool, json: bool) -> Result<()> {
    let options = ParseOptions {
        enable_ocr: !no_ocr,
        ..ParseOptions::default()
    };
    let ocr = docpulp::ocr::get_ocr_pool().context("failed to create OCR pool")?;

    let result = parse_file(&path, &options, ocr)
        .await
        .with_context(|| format!("failed to parse {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.content);
        tracing::info!(
            pages = result.metadata.page_count,
            images = result.metadata.image_count,
            tables = result.metadata.table_count,
            ocr = result.metadata.ocr_count,
            parse_time_ms = result.metadata.parse_time_ms,
            "extraction finished"
        );
    }

    docpulp::ocr::shutdown_ocr_pool().await;
    Ok(())
}

/// Install the subscriber: env-filtered, writing to both stderr and the
/// rotating file sink configured by the PARSER_LOG_* variables.
fn init_logging() -> Result<()> {
    let log = LogConfig::from_env();
    std::fs::create_dir_all(&log.dir)
        .with_context(|| format!("failed to create log dir {}", log.dir.display()))?;

    let file_appender = tracing_appender::rolling::never(&log.dir, &log.file);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log.level.to_lowercase()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_appender))
        .init();
    Ok(())
}

fn init_stderr_logging() -> Result<()> {
    let log = LogConfig::from_env();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log.level.to_lowercase()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(())
}
