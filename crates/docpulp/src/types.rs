//! Core data model: fragments, page results, parse output and options.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Order key assigned to speaker notes so they sort after every shape on the
/// slide.
pub const NOTES_ORDER_KEY: u32 = u32::MAX;

/// Recognized document formats, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Pptx,
    Markdown,
}

impl DocumentFormat {
    /// Resolve a format from a file name's extension. Matching is
    /// case-insensitive; unknown extensions return `None`.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let ext = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" | "doc" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    /// Canonical extension used when writing the request payload to disk.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Pptx => "pptx",
            Self::Markdown => "md",
        }
    }

    /// Cap on in-flight OCR submissions for documents of this format.
    pub fn max_concurrent_ocr(&self) -> usize {
        match self {
            Self::Pptx => 10,
            _ => 5,
        }
    }
}

/// One ordered piece of a page's output.
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentKind {
    /// Plain extracted text.
    Text(String),
    /// A table already rendered as Markdown.
    Table(String),
    /// Placeholder for an on-disk image awaiting OCR resolution.
    Image(PathBuf),
}

/// A fragment plus the extractor-assigned intra-page order key.
///
/// Order keys are monotonically non-decreasing within a page and carry no
/// meaning across pages; cross-page ordering is governed by the page index.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub order: u32,
    pub kind: FragmentKind,
}

impl Fragment {
    pub fn text(order: u32, text: impl Into<String>) -> Self {
        Self {
            order,
            kind: FragmentKind::Text(text.into()),
        }
    }

    pub fn table(order: u32, markdown: impl Into<String>) -> Self {
        Self {
            order,
            kind: FragmentKind::Table(markdown.into()),
        }
    }

    pub fn image(order: u32, path: impl Into<PathBuf>) -> Self {
        Self {
            order,
            kind: FragmentKind::Image(path.into()),
        }
    }
}

/// Output of a single page worker.
///
/// Invariant: every `FragmentKind::Image` path in `fragments` appears in
/// `image_refs` and vice versa. The orchestrator owns the referenced files
/// exclusively once the worker returns.
#[derive(Debug, Clone, Default)]
pub struct PageResult {
    pub page_index: usize,
    pub fragments: Vec<Fragment>,
    pub image_refs: Vec<PathBuf>,
}

impl PageResult {
    pub fn empty(page_index: usize) -> Self {
        Self {
            page_index,
            ..Default::default()
        }
    }

    pub fn push_text(&mut self, order: u32, text: impl Into<String>) {
        self.fragments.push(Fragment::text(order, text));
    }

    pub fn push_table(&mut self, order: u32, markdown: impl Into<String>) {
        self.fragments.push(Fragment::table(order, markdown));
    }

    pub fn push_image(&mut self, order: u32, path: PathBuf) {
        self.image_refs.push(path.clone());
        self.fragments.push(Fragment::image(order, path));
    }
}

/// OCR results keyed by image ref. Entries whose recognized text is empty
/// after trimming are omitted.
pub type OcrOutcomes = HashMap<PathBuf, String>;

/// Counters describing one parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseMetadata {
    /// Page count for PDF, slide count for PPTX; 0 for DOCX and Markdown.
    pub page_count: usize,
    /// Images that survived the background filter.
    pub image_count: usize,
    /// Table fragments emitted.
    pub table_count: usize,
    /// Images whose OCR produced non-empty text.
    pub ocr_count: usize,
    /// Reserved for image captioning; always 0.
    pub caption_count: usize,
    /// Wall-clock parse time in milliseconds.
    pub parse_time_ms: f64,
}

/// Final artifact returned for a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResult {
    pub content: String,
    pub metadata: ParseMetadata,
}

/// Per-request parse options carried by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Run OCR on surviving images. When false, placeholders are dropped and
    /// `ocr_count` stays 0; `image_count` is unaffected.
    pub enable_ocr: bool,
    /// Accepted for forward compatibility; captioning is inactive and
    /// `caption_count` always stays 0.
    pub enable_caption: bool,
    /// Byte cap used by the background filter. 0 selects the default
    /// (300 KiB).
    pub max_image_size: usize,
    /// Recognition language hint forwarded to the OCR engine.
    pub language: String,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            enable_ocr: true,
            enable_caption: false,
            max_image_size: 0,
            language: "ch".to_string(),
        }
    }
}

impl ParseOptions {
    /// Effective background-filter byte cap.
    pub fn max_image_bytes(&self) -> usize {
        if self.max_image_size == 0 {
            crate::image_filter::DEFAULT_MAX_IMAGE_BYTES
        } else {
            self.max_image_size
        }
    }
}
