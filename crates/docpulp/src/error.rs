//! Crate-wide error type.
//!
//! Every fallible operation in docpulp returns [`Result`]. The variants map
//! onto the service's error taxonomy: validation failures are rejected before
//! any work happens, per-image and per-page failures are confined by the
//! orchestrator, and only `Fatal` surfaces to the transport as an internal
//! error.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DocpulpError>;

/// All errors produced by docpulp.
#[derive(Debug, thiserror::Error)]
pub enum DocpulpError {
    /// Request-level validation failure (empty content, missing file name).
    /// Never triggers any parsing work.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The file extension is not one of the recognized document formats.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Image bytes could not be decoded. Confined to the image that produced
    /// it; inside OCR workers this degrades to an empty recognition result.
    #[error("image decode error: {message}")]
    ImageDecode { message: String },

    /// The OCR engine failed to initialize or recognize. Same confinement as
    /// `ImageDecode`.
    #[error("ocr engine error: {message}")]
    OcrEngine { message: String },

    /// A format extractor failed on one page. The page contributes an empty
    /// result; the request still succeeds with the remaining pages.
    #[error("extraction error: {message}")]
    Extraction {
        message: String,
        page_index: Option<usize>,
    },

    /// A pool task exceeded its deadline (300 s per page, 180 s per image).
    /// Treated as the corresponding extraction/OCR failure.
    #[error("timed out: {message}")]
    Timeout { message: String },

    /// Worker IPC payload could not be encoded or decoded.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Catastrophic orchestrator failure after all fallbacks. Mapped to an
    /// internal error by the facade.
    #[error("{message}")]
    Fatal { message: String },
}

impl DocpulpError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn image_decode(message: impl Into<String>) -> Self {
        Self::ImageDecode {
            message: message.into(),
        }
    }

    pub fn ocr_engine(message: impl Into<String>) -> Self {
        Self::OcrEngine {
            message: message.into(),
        }
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
            page_index: None,
        }
    }

    pub fn extraction_on_page(message: impl Into<String>, page_index: usize) -> Self {
        Self::Extraction {
            message: format!("page {page_index}: {}", message.into()),
            page_index: Some(page_index),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// True for errors the facade maps to a 400-class response.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::UnsupportedFormat(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_error_includes_page() {
        let err = DocpulpError::extraction_on_page("boom", 3);
        assert_eq!(err.to_string(), "extraction error: page 3: boom");
        assert!(matches!(err, DocpulpError::Extraction { page_index: Some(3), .. }));

        let err = DocpulpError::extraction("boom");
        assert_eq!(err.to_string(), "extraction error: boom");
    }

    #[test]
    fn test_validation_classification() {
        assert!(DocpulpError::validation("x").is_validation());
        assert!(DocpulpError::UnsupportedFormat(".xyz".into()).is_validation());
        assert!(!DocpulpError::fatal("x").is_validation());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: DocpulpError = io.into();
        assert!(err.to_string().contains("missing"));
    }
}
