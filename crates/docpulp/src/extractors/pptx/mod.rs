//! PPTX extractor: one task per slide.
//!
//! The title (if any) leads the slide with order key 0, remaining shapes
//! follow in their native order, and speaker notes sort last. Pictures are
//! raster-only: vector and exotic formats are skipped without error.

mod container;
mod parser;

use std::path::Path;

use crate::error::Result;
use crate::image_filter::{is_background, MIN_IMAGE_BYTES};
use crate::table::cells_to_markdown;
use crate::types::{PageResult, NOTES_ORDER_KEY};

pub use container::PptxContainer;
use parser::SlideElement;

/// Raster formats the OCR tier accepts.
const ALLOWED_IMAGE_FORMATS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tiff", "tif"];

/// Number of slides in the deck; used by the orchestrator to fan out.
pub fn count_slides(source_path: &Path) -> Result<usize> {
    Ok(PptxContainer::open(source_path)?.slide_count())
}

/// Extract one slide into ordered fragments plus image refs on disk.
pub fn extract_slide(
    slide_index: usize,
    source_path: &Path,
    temp_dir: &Path,
    max_image_bytes: usize,
) -> Result<PageResult> {
    let mut container = PptxContainer::open(source_path)?;
    let xml = container.slide_xml(slide_index)?;
    let rels = container.slide_rels(slide_index)?;
    let elements = parser::parse_slide_xml(&xml)?;

    let mut page = PageResult::empty(slide_index);
    let mut image_number = 0usize;

    // The first title shape leads the slide; everything else keeps its
    // native position after it.
    if let Some(title) = elements.iter().find_map(|el| match el {
        SlideElement::Text { text, is_title: true } => Some(text.clone()),
        _ => None,
    }) {
        page.push_text(0, format!("### {}", title.replace('\n', " ")));
    }

    let mut title_consumed = false;
    for (position, element) in elements.into_iter().enumerate() {
        let order = (position + 1) as u32;
        match element {
            SlideElement::Text { is_title: true, .. } if !title_consumed => {
                title_consumed = true;
            }
            SlideElement::Text { text, .. } => page.push_text(order, text),
            SlideElement::Table(rows) => {
                let markdown = cells_to_markdown(&rows);
                if !markdown.is_empty() {
                    page.push_table(order, markdown);
                }
            }
            SlideElement::Picture {
                rel_id,
                width_px,
                height_px,
            } => {
                let Some(target) = rels.get(&rel_id).cloned() else {
                    tracing::debug!(%rel_id, "picture relationship missing, skipping");
                    continue;
                };
                let Some(ext) = accepted_extension(&target) else {
                    tracing::debug!(%target, "non-raster picture format, skipping");
                    continue;
                };
                let bytes = match container.media_bytes(slide_index, &target) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(%target, error = %e, "failed to read slide media");
                        continue;
                    }
                };
                if bytes.len() < MIN_IMAGE_BYTES {
                    tracing::debug!(%target, size = bytes.len(), "skipping icon-sized slide image");
                    continue;
                }
                if is_background(&bytes, width_px, height_px, max_image_bytes) {
                    tracing::debug!(%target, ?width_px, ?height_px, "skipping background slide image");
                    continue;
                }
                image_number += 1;
                let path = temp_dir.join(format!("slide_{slide_index}_image_{image_number}.{ext}"));
                if let Err(e) = std::fs::write(&path, &bytes) {
                    tracing::warn!(path = %path.display(), error = %e, "failed to persist slide image");
                    continue;
                }
                page.push_image(order, path);
            }
        }
    }

    if let Some(notes_xml) = container.notes_xml(slide_index, &rels) {
        match parser::parse_notes_xml(&notes_xml) {
            Ok(notes) if !notes.is_empty() => page.push_text(NOTES_ORDER_KEY, notes),
            Ok(_) => {}
            Err(e) => tracing::debug!(slide_index, error = %e, "unreadable notes part, skipping"),
        }
    }

    Ok(page)
}

/// Accept only raster extensions; the format comes from the rels target.
fn accepted_extension(target: &str) -> Option<String> {
    let ext = target.rsplit('.').next()?.to_ascii_lowercase();
    if ALLOWED_IMAGE_FORMATS.contains(&ext.as_str()) {
        Some(ext)
    } else {
        None
    }
}
