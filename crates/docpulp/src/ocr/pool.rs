//! OCR worker pool: isolated child processes with bounded concurrency.
//!
//! The recognition runtime is neither fork-safe nor callable from multiple
//! threads of one process, so the pool runs it in spawned child processes
//! (the current executable re-invoked with the `ocr-worker` subcommand) and
//! talks to each over a framed stdin/stdout channel, one outstanding task
//! per worker. Spawn-style start is a correctness requirement, not a
//! performance choice: a worker must begin with no inherited engine state.
//!
//! The pool is a process-wide singleton shared by every in-flight request;
//! workers are spawned on demand up to the configured size and respawned
//! after a timeout or IPC failure.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Semaphore;

use crate::core::config::{OcrPoolConfig, OCR_TASK_TIMEOUT};
use crate::error::{DocpulpError, Result};
use crate::ocr::protocol::{read_frame_async, write_frame_async, WorkerReply, WorkerRequest};

/// How long to wait for a fresh worker's `Ready` frame. Model loading
/// dominates this.
const READY_TIMEOUT: Duration = Duration::from_secs(120);

static OCR_POOL: OnceCell<Arc<OcrWorkerPool>> = OnceCell::new();

/// Seam between the orchestrator and the OCR tier. Implementations never
/// error: every failure mode is an empty recognition result.
#[async_trait]
pub trait OcrService: Send + Sync {
    /// Recognize one image; empty string when nothing was recognized or the
    /// attempt failed.
    async fn recognize(&self, image: Vec<u8>) -> String;
}

struct Worker {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
}

impl Worker {
    async fn spawn(program: &Path, args: &[String]) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DocpulpError::ocr_engine(format!("failed to spawn OCR worker: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DocpulpError::ocr_engine("worker stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DocpulpError::ocr_engine("worker stdout unavailable".to_string()))?;
        let mut worker = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            next_id: 0,
        };

        let ready = tokio::time::timeout(READY_TIMEOUT, read_frame_async::<WorkerReply, _>(&mut worker.stdout))
            .await
            .map_err(|_| DocpulpError::timeout("OCR worker did not become ready".to_string()))??;

        match ready {
            WorkerReply::Ready { pid, engine_ready } => {
                if engine_ready {
                    tracing::info!(pid, "OCR worker ready");
                } else {
                    tracing::warn!(pid, "OCR worker started without a usable engine");
                }
                Ok(worker)
            }
            other => Err(DocpulpError::ocr_engine(format!(
                "unexpected first frame from worker: {other:?}"
            ))),
        }
    }

    /// Run one task. Any error here retires the worker.
    async fn run_task(&mut self, image: Vec<u8>) -> Result<String> {
        self.next_id += 1;
        let id = self.next_id;
        write_frame_async(&mut self.stdin, &WorkerRequest::Task { id, image }).await?;

        loop {
            let reply: WorkerReply = read_frame_async(&mut self.stdout).await?;
            match reply {
                WorkerReply::Done { id: reply_id, text } if reply_id == id => return Ok(text),
                WorkerReply::Done { id: stale, .. } => {
                    tracing::debug!(stale, expected = id, "discarding stale worker reply");
                }
                WorkerReply::Ready { .. } => {
                    return Err(DocpulpError::ocr_engine("worker re-sent Ready mid-stream".to_string()));
                }
            }
        }
    }

    async fn shutdown(mut self) {
        let _ = write_frame_async(&mut self.stdin, &WorkerRequest::Shutdown).await;
        let _ = tokio::time::timeout(Duration::from_secs(2), self.child.wait()).await;
    }

    async fn kill(mut self) {
        let _ = self.child.kill().await;
    }
}

/// Process-wide pool of OCR worker processes.
pub struct OcrWorkerPool {
    program: PathBuf,
    args: Vec<String>,
    idle: Mutex<Vec<Worker>>,
    slots: Semaphore,
    size: usize,
}

impl OcrWorkerPool {
    /// Build a pool that spawns `program args...` per worker.
    pub fn new(config: &OcrPoolConfig, program: PathBuf, args: Vec<String>) -> Self {
        let size = config.size();
        tracing::info!(size, program = %program.display(), "creating OCR worker pool (spawn start)");
        Self {
            program,
            args,
            idle: Mutex::new(Vec::new()),
            slots: Semaphore::new(size),
            size,
        }
    }

    /// Build a pool from the environment, re-invoking the current executable
    /// with the `ocr-worker` subcommand. `PARSER_OCR_WORKER_CMD` overrides
    /// the command line (whitespace-split), which test harnesses use.
    pub fn from_env() -> Result<Self> {
        let config = OcrPoolConfig::from_env();
        if let Ok(raw) = std::env::var("PARSER_OCR_WORKER_CMD") {
            let mut parts = raw.split_whitespace().map(String::from);
            let program = parts
                .next()
                .ok_or_else(|| DocpulpError::validation("PARSER_OCR_WORKER_CMD is empty"))?;
            return Ok(Self::new(&config, PathBuf::from(program), parts.collect()));
        }

        let exe = std::env::current_exe()?;
        Ok(Self::new(&config, exe, vec!["ocr-worker".to_string()]))
    }

    /// Configured worker count.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Spawn all workers up front so the first request does not pay
    /// model-load latency.
    pub async fn prewarm(&self) -> Result<()> {
        let mut spawned = Vec::with_capacity(self.size);
        for _ in 0..self.size {
            spawned.push(Worker::spawn(&self.program, &self.args).await?);
        }
        let mut idle = self.idle.lock();
        idle.extend(spawned);
        tracing::info!(count = self.size, "OCR pool prewarmed");
        Ok(())
    }

    async fn checkout(&self) -> Result<Worker> {
        if let Some(worker) = self.idle.lock().pop() {
            return Ok(worker);
        }
        Worker::spawn(&self.program, &self.args).await
    }

    /// Tear the pool down, draining idle workers.
    pub async fn shutdown(&self) {
        let workers: Vec<Worker> = self.idle.lock().drain(..).collect();
        for worker in workers {
            worker.shutdown().await;
        }
        tracing::info!("OCR pool shut down");
    }
}

#[async_trait]
impl OcrService for OcrWorkerPool {
    async fn recognize(&self, image: Vec<u8>) -> String {
        let _permit = match self.slots.acquire().await {
            Ok(permit) => permit,
            Err(_) => return String::new(),
        };

        let mut worker = match self.checkout().await {
            Ok(worker) => worker,
            Err(e) => {
                tracing::warn!(error = %e, "could not obtain OCR worker");
                return String::new();
            }
        };

        match tokio::time::timeout(OCR_TASK_TIMEOUT, worker.run_task(image)).await {
            Ok(Ok(text)) => {
                self.idle.lock().push(worker);
                text
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "OCR worker failed, retiring it");
                worker.kill().await;
                String::new()
            }
            Err(_) => {
                tracing::warn!(timeout_s = OCR_TASK_TIMEOUT.as_secs(), "OCR task timed out, retiring worker");
                worker.kill().await;
                String::new()
            }
        }
    }
}

/// Global pool accessor. The pool is created lazily from the environment on
/// first use and shared by all requests.
pub fn get_ocr_pool() -> Result<Arc<OcrWorkerPool>> {
    OCR_POOL
        .get_or_try_init(|| OcrWorkerPool::from_env().map(Arc::new))
        .map(Arc::clone)
}

/// Shut the global pool down if it was ever created.
pub async fn shutdown_ocr_pool() {
    if let Some(pool) = OCR_POOL.get() {
        pool.shutdown().await;
    }
}
