//! Markdown extractor: a one-shot decode with multi-encoding fallback.
//!
//! Markdown needs no structural processing; the artifact is the decoded
//! text itself with all markup preserved. The fallback chain handles the
//! common Chinese office encodings before giving up to Latin-1, which can
//! represent any byte sequence.

use encoding_rs::{GB18030, GBK};

/// Decode document bytes: UTF-8, then GB18030, then GBK, then Latin-1.
///
/// Valid UTF-8 input decodes exactly; the Latin-1 tail maps every byte to
/// the corresponding code point and therefore never fails.
pub fn decode_bytes(content: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(content) {
        return text.to_string();
    }

    for encoding in [GB18030, GBK] {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(content) {
            return text.into_owned();
        }
    }

    content.iter().map(|&b| b as char).collect()
}

/// Extract a Markdown document.
pub fn extract(content: &[u8]) -> String {
    decode_bytes(content)
}
