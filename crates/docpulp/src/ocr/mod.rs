//! OCR subsystem: runtime adapter, worker process entry point, and the
//! isolated-process pool that fronts them.

pub mod engine;
pub mod pool;
pub mod protocol;
pub mod worker;

pub use pool::{get_ocr_pool, shutdown_ocr_pool, OcrService, OcrWorkerPool};
pub use worker::run_ocr_worker;
