//! Per-format extraction pipelines.
//!
//! Every extractor presents the same contract: a pure, top-level
//! `extract_page(page_index, source_path, temp_dir, limits)` suitable for
//! dispatch onto the page pool, plus a cheap page count read in the parent.
//! Markdown never reaches this module; the orchestrator short-circuits it.

pub mod docx;
pub mod markdown;
pub mod pdf;
pub mod pptx;

use std::path::Path;

use crate::error::{DocpulpError, Result};
use crate::types::{DocumentFormat, PageResult};

/// Number of page-level tasks for a document. DOCX is a single
/// whole-document task.
pub fn count_pages(format: DocumentFormat, source_path: &Path) -> Result<usize> {
    match format {
        DocumentFormat::Pdf => pdf::count_pages(source_path),
        DocumentFormat::Pptx => pptx::count_slides(source_path),
        DocumentFormat::Docx => Ok(1),
        DocumentFormat::Markdown => Err(DocpulpError::extraction(
            "markdown does not use page extraction".to_string(),
        )),
    }
}

/// Run the format's page extractor. Pure function of its arguments; each
/// call opens its own handle on `source_path`.
pub fn extract_page(
    format: DocumentFormat,
    page_index: usize,
    source_path: &Path,
    temp_dir: &Path,
    max_image_bytes: usize,
) -> Result<PageResult> {
    match format {
        DocumentFormat::Pdf => pdf::extract_page(page_index, source_path, temp_dir, max_image_bytes),
        DocumentFormat::Pptx => pptx::extract_slide(page_index, source_path, temp_dir, max_image_bytes),
        DocumentFormat::Docx => docx::extract(source_path, temp_dir, max_image_bytes),
        DocumentFormat::Markdown => Err(DocpulpError::extraction(
            "markdown does not use page extraction".to_string(),
        )),
    }
}

/// Sniff a raster format from magic bytes; used when naming image files on
/// disk.
pub(crate) fn detect_image_format(data: &[u8]) -> &'static str {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "jpeg"
    } else if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        "png"
    } else if data.starts_with(b"GIF8") {
        "gif"
    } else if data.starts_with(b"BM") {
        "bmp"
    } else if data.starts_with(&[0x49, 0x49, 0x2A, 0x00]) || data.starts_with(&[0x4D, 0x4D, 0x00, 0x2A]) {
        "tiff"
    } else {
        "png"
    }
}
