//! DOCX extractor: whole-document, body order preserved.
//!
//! DOCX has no page model at extraction time, so the whole document is one
//! task (page index 0) and `page_count` stays 0 in the metadata. The rich
//! path interleaves paragraphs, tables and inline images exactly as they
//! appear in the body; any failure there falls back to a simple text-only
//! pass. The two paths share no state; the fallback re-opens the source.

mod parser;

use std::path::Path;

use crate::error::{DocpulpError, Result};
use crate::image_filter::{is_background, MIN_IMAGE_BYTES};
use crate::table::cells_to_markdown;
use crate::types::PageResult;

use parser::{BodyItem, DocxDocument};

/// Extract the full document. Images that survive the icon cutoff and the
/// background filter land in `temp_dir` as `docx_image_{j}.{ext}`.
pub fn extract(source_path: &Path, temp_dir: &Path, max_image_bytes: usize) -> Result<PageResult> {
    match extract_rich(source_path, temp_dir, max_image_bytes) {
        Ok(page) => Ok(page),
        Err(e) => {
            tracing::warn!(error = %e, "rich DOCX extraction failed, using simple fallback");
            extract_simple(source_path)
        }
    }
}

fn extract_rich(source_path: &Path, temp_dir: &Path, max_image_bytes: usize) -> Result<PageResult> {
    let mut document = DocxDocument::open(source_path)?;
    let mut page = PageResult::empty(0);
    let mut order = 0u32;
    let mut image_number = 0usize;

    let items = std::mem::take(&mut document.items);
    for item in items {
        match item {
            BodyItem::Paragraph { text, image_rel_ids } => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    page.push_text(order, trimmed);
                    order += 1;
                }
                for rel_id in image_rel_ids {
                    let bytes = match document.media_bytes(&rel_id) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            tracing::warn!(%rel_id, error = %e, "failed to resolve DOCX image");
                            continue;
                        }
                    };
                    if bytes.len() < MIN_IMAGE_BYTES {
                        tracing::debug!(%rel_id, size = bytes.len(), "skipping icon-sized DOCX image");
                        continue;
                    }
                    // Dimensions are unknown at this point, so the filter
                    // degrades to size plus a header probe.
                    if is_background(&bytes, None, None, max_image_bytes) {
                        tracing::debug!(%rel_id, size_kb = bytes.len() / 1024, "skipping background DOCX image");
                        continue;
                    }
                    image_number += 1;
                    let ext = super::detect_image_format(&bytes);
                    let path = temp_dir.join(format!("docx_image_{image_number}.{ext}"));
                    if let Err(e) = std::fs::write(&path, &bytes) {
                        tracing::warn!(path = %path.display(), error = %e, "failed to persist DOCX image");
                        continue;
                    }
                    page.push_image(order, path);
                    order += 1;
                }
            }
            BodyItem::Table(rows) => {
                let markdown = cells_to_markdown(&rows);
                if !markdown.is_empty() {
                    page.push_table(order, markdown);
                    order += 1;
                }
            }
        }
    }

    Ok(page)
}

/// Text-only fallback: paragraph text, then naive `cell | cell` row joins.
/// Emits no images.
fn extract_simple(source_path: &Path) -> Result<PageResult> {
    let document_xml = read_document_xml(source_path)?;
    let (paragraphs, rows) = parser::parse_simple(&document_xml);

    let mut page = PageResult::empty(0);
    let mut order = 0u32;
    for text in paragraphs {
        page.push_text(order, text);
        order += 1;
    }
    for row in rows {
        let joined = row
            .iter()
            .map(|cell| cell.trim())
            .collect::<Vec<_>>()
            .join(" | ");
        if !joined.trim().is_empty() {
            page.push_text(order, joined);
            order += 1;
        }
    }
    Ok(page)
}

fn read_document_xml(source_path: &Path) -> Result<String> {
    use std::io::Read;

    let file = std::fs::File::open(source_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| DocpulpError::extraction(format!("failed to open DOCX archive: {e}")))?;
    let mut part = archive
        .by_name("word/document.xml")
        .map_err(|_| DocpulpError::extraction("word/document.xml not found".to_string()))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    Ok(xml)
}
