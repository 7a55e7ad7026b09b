//! Parse orchestration: the two-level pipeline behind every request.
//!
//! Pages fan out onto the shared page pool, their fragments come back with
//! image refs on disk, surviving images fan out onto the OCR tier under a
//! per-format concurrency cap, and the final artifact is reassembled in
//! `(page_index, order_key)` order; completion order is never trusted.
//! Failures stay confined: a broken page or image costs only its own
//! contribution.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;

use crate::core::config::OCR_TASK_TIMEOUT;
use crate::error::{DocpulpError, Result};
use crate::extractors;
use crate::narrative;
use crate::ocr::OcrService;
use crate::page_pool::run_page_task;
use crate::types::{
    DocumentFormat, FragmentKind, OcrOutcomes, PageResult, ParseMetadata, ParseOptions, ParseResult,
};

/// Page separator in PDF output.
const PAGE_BREAK: &str = "\n\n--- Page Break ---\n\n";

/// Parse a document carried as raw bytes plus its file name.
///
/// The request owns a fresh temp directory for the duration of the call; it
/// is removed on every exit path, including errors.
pub async fn parse_bytes(
    file_bytes: &[u8],
    file_name: &str,
    options: &ParseOptions,
    ocr: Arc<dyn OcrService>,
) -> Result<ParseResult> {
    let started = Instant::now();

    let format = DocumentFormat::from_file_name(file_name)
        .ok_or_else(|| DocpulpError::UnsupportedFormat(file_name.to_string()))?;

    // Markdown needs no pipeline at all.
    if format == DocumentFormat::Markdown {
        let content = crate::extractors::markdown::extract(file_bytes);
        return Ok(ParseResult {
            content,
            metadata: ParseMetadata {
                parse_time_ms: elapsed_ms(started),
                ..Default::default()
            },
        });
    }

    let temp_dir = tempfile::Builder::new()
        .prefix("docpulp_")
        .tempdir()
        .map_err(DocpulpError::Io)?;
    let source_path = temp_dir.path().join(format!("document.{}", format.extension()));
    tokio::fs::write(&source_path, file_bytes).await?;

    // Count pages in the parent; an unloadable document fails the request
    // here rather than poisoning the pools.
    let page_count = extractors::count_pages(format, &source_path)
        .map_err(|e| DocpulpError::fatal(format!("cannot open document: {e}")))?;

    let pages = extract_pages(format, page_count, &source_path, temp_dir.path(), options).await?;

    let ordered_refs = collect_image_refs(&pages);
    let outcomes = if options.enable_ocr && !ordered_refs.is_empty() {
        run_ocr(&ordered_refs, format, ocr).await
    } else {
        OcrOutcomes::new()
    };

    let content = assemble(format, &pages, &outcomes);
    let metadata = ParseMetadata {
        page_count: match format {
            DocumentFormat::Pdf | DocumentFormat::Pptx => page_count,
            _ => 0,
        },
        image_count: ordered_refs.len(),
        table_count: pages
            .iter()
            .flat_map(|p| &p.fragments)
            .filter(|f| matches!(f.kind, FragmentKind::Table(_)))
            .count(),
        ocr_count: outcomes.len(),
        caption_count: 0,
        parse_time_ms: elapsed_ms(started),
    };

    tracing::info!(
        file_name,
        pages = metadata.page_count,
        images = metadata.image_count,
        tables = metadata.table_count,
        ocr = metadata.ocr_count,
        "parse complete"
    );

    Ok(ParseResult { content, metadata })
}

/// Convenience wrapper for local (non-facade) callers.
pub async fn parse_file(path: &std::path::Path, options: &ParseOptions, ocr: Arc<dyn OcrService>) -> Result<ParseResult> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| DocpulpError::validation("path has no file name"))?;
    parse_bytes(&bytes, &file_name, options, ocr).await
}

/// Fan page tasks out onto the shared pool and gather them in index order.
async fn extract_pages(
    format: DocumentFormat,
    page_count: usize,
    source_path: &std::path::Path,
    temp_dir: &std::path::Path,
    options: &ParseOptions,
) -> Result<Vec<PageResult>> {
    let max_image_bytes = options.max_image_bytes();
    let mut handles = Vec::with_capacity(page_count);
    for page_index in 0..page_count {
        let source = source_path.to_path_buf();
        let tmp = temp_dir.to_path_buf();
        handles.push(tokio::spawn(async move {
            run_page_task(move || extractors::extract_page(format, page_index, &source, &tmp, max_image_bytes)).await
        }));
    }

    let mut pages = Vec::with_capacity(page_count);
    for (page_index, handle) in handles.into_iter().enumerate() {
        let outcome = handle
            .await
            .unwrap_or_else(|e| Err(DocpulpError::extraction_on_page(e.to_string(), page_index)));
        match outcome {
            Ok(page) => pages.push(page),
            Err(e) => {
                // DOCX is a single whole-document task, so its failure is
                // the request's failure. Elsewhere the page just goes dark.
                if format == DocumentFormat::Docx {
                    return Err(DocpulpError::fatal(format!("document extraction failed: {e}")));
                }
                tracing::warn!(page_index, error = %e, "page extraction failed, skipping page");
                pages.push(PageResult::empty(page_index));
            }
        }
    }

    pages.sort_by_key(|p| p.page_index);
    Ok(pages)
}

/// Image refs in (page, order-key) order, each with its page index and
/// 1-based ordinal within that page.
fn collect_image_refs(pages: &[PageResult]) -> Vec<(PathBuf, usize, usize)> {
    let mut refs = Vec::new();
    for page in pages {
        let mut fragments: Vec<_> = page.fragments.iter().collect();
        fragments.sort_by_key(|f| f.order);
        let mut ordinal = 0usize;
        for fragment in fragments {
            if let FragmentKind::Image(path) = &fragment.kind {
                ordinal += 1;
                refs.push((path.clone(), page.page_index, ordinal));
            }
        }
    }
    refs
}

/// Read each ref and fan recognition out under the per-format concurrency
/// cap. Failures and empty results are omitted from the outcome map.
async fn run_ocr(
    refs: &[(PathBuf, usize, usize)],
    format: DocumentFormat,
    ocr: Arc<dyn OcrService>,
) -> OcrOutcomes {
    let semaphore = Arc::new(Semaphore::new(format.max_concurrent_ocr()));
    let mut handles = Vec::with_capacity(refs.len());

    for (path, page_index, ordinal) in refs.iter().cloned() {
        let semaphore = Arc::clone(&semaphore);
        let ocr = Arc::clone(&ocr);
        handles.push(tokio::spawn(async move {
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read image ref");
                    return None;
                }
            };
            let _permit = semaphore.acquire().await.ok()?;
            let text = match tokio::time::timeout(OCR_TASK_TIMEOUT, ocr.recognize(bytes)).await {
                Ok(text) => text,
                Err(_) => {
                    tracing::warn!(
                        page_index,
                        ordinal,
                        path = %path.display(),
                        "image OCR timed out, skipping"
                    );
                    return None;
                }
            };
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some((path, trimmed.to_string()))
            }
        }));
    }

    let mut outcomes = OcrOutcomes::new();
    for handle in handles {
        if let Ok(Some((path, text))) = handle.await {
            outcomes.insert(path, text);
        }
    }
    outcomes
}

/// Reassemble the final artifact in (page, order-key) order.
fn assemble(format: DocumentFormat, pages: &[PageResult], outcomes: &OcrOutcomes) -> String {
    match format {
        DocumentFormat::Pdf => {
            let rendered: Vec<String> = pages.iter().map(|p| render_page(p, outcomes)).collect();
            rendered.join(PAGE_BREAK)
        }
        DocumentFormat::Docx => pages.iter().map(|p| render_page(p, outcomes)).collect::<Vec<_>>().join("\n\n"),
        DocumentFormat::Pptx => {
            let mut slides = Vec::new();
            for page in pages {
                let body = render_page(page, outcomes);
                if !body.is_empty() {
                    slides.push(format!("## Slide {}\n\n{body}", page.page_index + 1));
                }
            }
            narrative::optimize(&slides.join("\n\n"))
        }
        DocumentFormat::Markdown => String::new(),
    }
}

/// Render one page: fragments in order-key order, placeholders resolved or
/// dropped, parts joined with blank lines.
fn render_page(page: &PageResult, outcomes: &OcrOutcomes) -> String {
    let mut fragments: Vec<_> = page.fragments.iter().collect();
    fragments.sort_by_key(|f| f.order);

    let mut ordinal = 0usize;
    let mut parts: Vec<String> = Vec::new();
    for fragment in fragments {
        match &fragment.kind {
            FragmentKind::Text(text) => parts.push(text.clone()),
            FragmentKind::Table(markdown) => parts.push(markdown.clone()),
            FragmentKind::Image(path) => {
                ordinal += 1;
                if let Some(text) = outcomes.get(path) {
                    parts.push(format!("[图像 {ordinal} OCR 内容]:\n{text}"));
                }
            }
        }
    }

    parts.join("\n\n")
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
