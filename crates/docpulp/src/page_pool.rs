//! Page worker pool: the CPU-bound extraction tier.
//!
//! One global pool is shared by every in-flight request, so N concurrent
//! documents queue here instead of multiplying workers. Extractors are pure
//! Rust over file handles they open themselves, which is what allows this
//! tier to run on OS threads; the OCR tier keeps its child processes (see
//! [`crate::ocr::pool`]) because its runtime cannot share a process.
//!
//! Sizing reserves cores for the OCR tier: `min(cpu_count - reserved, cap)`
//! with reserved = 2 and cap = 32 by default, all environment-overridable.

use std::panic::{self, AssertUnwindSafe};

use once_cell::sync::OnceCell;
use tokio::sync::oneshot;

use crate::core::config::{PagePoolConfig, PAGE_TASK_TIMEOUT};
use crate::error::{DocpulpError, Result};

static PAGE_POOL: OnceCell<rayon::ThreadPool> = OnceCell::new();

/// Get the global page pool, building it from the environment on first use.
pub fn get_page_pool() -> &'static rayon::ThreadPool {
    PAGE_POOL.get_or_init(|| {
        let config = PagePoolConfig::from_env();
        let size = config.size();
        tracing::info!(size, cpus = num_cpus::get(), "creating global page pool");
        rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|i| format!("docpulp-page-{i}"))
            .panic_handler(|_| tracing::warn!("page task panicked"))
            .build()
            .expect("page pool construction cannot fail with a positive thread count")
    })
}

/// Run one extraction task on the page pool with the per-page deadline.
///
/// A timed-out task is abandoned, not cancelled: the closure may keep
/// running on its pool thread, but its result is discarded. Panics inside
/// the task surface as extraction errors.
pub async fn run_page_task<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    get_page_pool().spawn(move || {
        let outcome = panic::catch_unwind(AssertUnwindSafe(task))
            .unwrap_or_else(|_| Err(DocpulpError::extraction("page task panicked")));
        let _ = tx.send(outcome);
    });

    match tokio::time::timeout(PAGE_TASK_TIMEOUT, rx).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_)) => Err(DocpulpError::extraction("page task dropped its result")),
        Err(_) => Err(DocpulpError::timeout(format!(
            "page task exceeded {} s",
            PAGE_TASK_TIMEOUT.as_secs()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_page_task_returns_value() {
        let value = run_page_task(|| Ok(41 + 1)).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_run_page_task_propagates_error() {
        let err = run_page_task::<(), _>(|| Err(DocpulpError::extraction("boom")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_run_page_task_contains_panic() {
        let err = run_page_task::<(), _>(|| panic!("exploded")).await.unwrap_err();
        assert!(matches!(err, DocpulpError::Extraction { .. }));
    }

    #[tokio::test]
    async fn test_tasks_run_concurrently_across_requests() {
        // Two tasks submitted from separate futures share the one pool.
        let (a, b) = tokio::join!(run_page_task(|| Ok(1)), run_page_task(|| Ok(2)));
        assert_eq!(a.unwrap() + b.unwrap(), 3);
    }

    #[test]
    fn test_pool_is_singleton() {
        let first = get_page_pool() as *const rayon::ThreadPool;
        let second = get_page_pool() as *const rayon::ThreadPool;
        assert_eq!(first, second);
    }
}
