//! Background-image filter applied before OCR.
//!
//! Filtering exists to avoid paying OCR latency and worker IPC cost on
//! decorative full-bleed artwork. False negatives (OCR runs on a background
//! image) are acceptable; false positives (a text-bearing figure is dropped)
//! are not, so every ambiguous case keeps the image.

use std::io::Cursor;

use image::ImageReader;

/// Default serialized-size cap. Larger images are treated as backgrounds.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 300 * 1024;

/// Raw blobs below this size are icon-like and skipped by the extractors
/// before the filter ever runs.
pub const MIN_IMAGE_BYTES: usize = 5 * 1024;

/// Dimension thresholds: an image wider than 1600 px AND taller than 900 px
/// is full-bleed artwork.
const MAX_WIDTH: u32 = 1600;
const MAX_HEIGHT: u32 = 900;

/// Minimum pixel edge for PDF page images; anything smaller is an icon.
pub const MIN_PDF_IMAGE_EDGE: u32 = 50;

/// Decide whether an image is a decorative background that should skip OCR.
///
/// When the caller already knows the pixel dimensions it passes them in;
/// otherwise the header is probed. A surviving image must be at most
/// `max_bytes` in serialized size AND have at least one dimension within the
/// threshold. If the header cannot be decoded the image is kept and OCR gets
/// to try.
pub fn is_background(bytes: &[u8], width: Option<u32>, height: Option<u32>, max_bytes: usize) -> bool {
    if bytes.len() > max_bytes {
        tracing::debug!(
            size_kb = bytes.len() / 1024,
            cap_kb = max_bytes / 1024,
            "background filter: oversized image"
        );
        return true;
    }

    let (w, h) = match (width, height) {
        (Some(w), Some(h)) => (w, h),
        _ => match probe_dimensions(bytes) {
            Some(dims) => dims,
            None => {
                tracing::debug!("background filter: undecodable header, keeping image");
                return false;
            }
        },
    };

    if w > MAX_WIDTH && h > MAX_HEIGHT {
        tracing::debug!(width = w, height = h, "background filter: full-bleed dimensions");
        return true;
    }

    false
}

/// Probe image dimensions from the header without decoding pixel data.
pub fn probe_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
