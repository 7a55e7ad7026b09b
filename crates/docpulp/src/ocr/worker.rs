//! OCR worker process entry point.
//!
//! The pool spawns the current executable with the `ocr-worker` subcommand
//! and speaks the framed protocol over stdin/stdout. Workers are always
//! fresh processes: the engine must never be inherited across a fork, and
//! eager initialization here means the first real request does not pay
//! model-load latency.
//!
//! A worker never lets a failure escape as a protocol error: any decode,
//! engine or panic condition degrades to an empty recognition result with a
//! WARN log, so a bad image can never poison the pool.

use std::io::{self, Read, Write};
use std::panic::{self, AssertUnwindSafe};

use crate::core::config::OcrPoolConfig;
use crate::error::Result;
use crate::ocr::engine::global_runtime;
use crate::ocr::protocol::{read_frame, write_frame, WorkerReply, WorkerRequest};

/// Run the worker loop until shutdown or EOF. Intended to be called from the
/// CLI's hidden `ocr-worker` subcommand with inherited stdio pipes.
pub fn run_ocr_worker() -> Result<()> {
    let config = OcrPoolConfig::from_env();
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut reader = stdin.lock();
    let mut writer = stdout.lock();
    run_worker_loop(&config, &mut reader, &mut writer)
}

/// Worker loop over arbitrary streams; split out for testing.
pub(crate) fn run_worker_loop(
    config: &OcrPoolConfig,
    reader: &mut impl Read,
    writer: &mut impl Write,
) -> Result<()> {
    let engine_ready = match global_runtime(&config.model_dir) {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(pid = std::process::id(), error = %e, "OCR engine init failed, worker will return empty results");
            false
        }
    };

    write_frame(
        writer,
        &WorkerReply::Ready {
            pid: std::process::id(),
            engine_ready,
        },
    )?;

    loop {
        let request: Option<WorkerRequest> = read_frame(reader)?;
        match request {
            Some(WorkerRequest::Task { id, image }) => {
                let text = recognize_guarded(config, &image);
                write_frame(writer, &WorkerReply::Done { id, text })?;
            }
            Some(WorkerRequest::Shutdown) | None => {
                tracing::debug!(pid = std::process::id(), "OCR worker shutting down");
                return Ok(());
            }
        }
    }
}

/// Recognize one image, converting every failure mode (decode error, engine
/// error, panic) into an empty string.
fn recognize_guarded(config: &OcrPoolConfig, image: &[u8]) -> String {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match global_runtime(&config.model_dir) {
        Ok(runtime) => match runtime.recognize(image) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(pid = std::process::id(), error = %e, "OCR recognition failed");
                String::new()
            }
        },
        Err(e) => {
            tracing::warn!(pid = std::process::id(), error = %e, "OCR engine unavailable");
            String::new()
        }
    }));

    match outcome {
        Ok(text) => text,
        Err(_) => {
            tracing::warn!(pid = std::process::id(), "OCR recognition panicked");
            String::new()
        }
    }
}
