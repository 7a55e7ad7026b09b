//! docpulp: a document-ingestion engine for LLM pipelines.
//!
//! Converts heterogeneous office documents (PDF, DOCX, PPTX, Markdown) into
//! a single text artifact enriched with Markdown tables and OCR-recovered
//! text from embedded raster images, and exposes that capability as a
//! network service so many consumers share one instance of the expensive
//! OCR runtime.
//!
//! # Architecture
//!
//! Two parallel tiers sit behind the orchestrator:
//!
//! - the **page tier** ([`page_pool`]) fans per-page extraction out over a
//!   process-wide compute pool shared by all in-flight requests;
//! - the **OCR tier** ([`ocr`]) runs recognition in spawned worker
//!   processes, because the engine is neither fork-safe nor shareable
//!   across threads of one process.
//!
//! Extractors ([`extractors`]) emit ordered fragment streams (text, Markdown
//! tables, image placeholders); the orchestrator
//! ([`core::orchestrator`]) reassembles them by `(page_index, order_key)`
//! and resolves placeholders against the OCR outcomes. Failures stay
//! confined: a corrupt image or a broken page never fails the request.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use docpulp::core::orchestrator::parse_bytes;
//! use docpulp::ocr::get_ocr_pool;
//! use docpulp::types::ParseOptions;
//!
//! # async fn example() -> docpulp::Result<()> {
//! let ocr = get_ocr_pool()?;
//! let result = parse_bytes(
//!     &std::fs::read("report.pdf")?,
//!     "report.pdf",
//!     &ParseOptions::default(),
//!     ocr,
//! )
//! .await?;
//! println!("{}", result.content);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod core;
pub mod error;
pub mod extractors;
pub mod image_filter;
pub mod narrative;
pub mod ocr;
pub mod page_pool;
pub mod table;
pub mod types;

pub use error::{DocpulpError, Result};
pub use types::{DocumentFormat, ParseMetadata, ParseOptions, ParseResult};
