//! PDF extractor: one task per page.
//!
//! Each page worker opens its own copy of the document (handles never cross
//! the pool boundary), interprets the content stream, detects tables with
//! the try-fallback strategy, and exports embedded raster images for OCR.
//! Order keys are a per-page counter in text → tables → images order.

mod content;
mod images;
mod tables;

use std::io::Cursor;
use std::path::Path;

use lopdf::Document;

use crate::error::{DocpulpError, Result};
use crate::image_filter::{is_background, MIN_PDF_IMAGE_EDGE};
use crate::table::cells_to_markdown;
use crate::types::PageResult;

pub use content::{PageContent, TextSpan};
pub use tables::DetectedTable;

/// Number of pages, read in the parent before fan-out.
pub fn count_pages(source_path: &Path) -> Result<usize> {
    let doc = load_document(source_path)?;
    Ok(doc.get_pages().len())
}

/// Extract one page into ordered fragments plus image refs on disk.
pub fn extract_page(
    page_index: usize,
    source_path: &Path,
    temp_dir: &Path,
    max_image_bytes: usize,
) -> Result<PageResult> {
    let doc = load_document(source_path)?;
    let page_id = *doc
        .get_pages()
        .values()
        .nth(page_index)
        .ok_or_else(|| DocpulpError::extraction_on_page("page index out of range", page_index))?;

    let page_content = content::interpret_page(&doc, page_id)
        .map_err(|e| DocpulpError::extraction_on_page(e.to_string(), page_index))?;

    let detected = tables::detect_tables(&page_content);

    let mut page = PageResult::empty(page_index);
    let mut order = 0u32;

    // Text objects consumed by a table are excluded by their vertical
    // center; the rest becomes the page's text fragment.
    let free_spans: Vec<&TextSpan> = page_content
        .spans
        .iter()
        .filter(|span| !detected.iter().any(|t| t.contains_y(span.center_y())))
        .collect();
    let text = tables::assemble_lines(&free_spans);
    if !text.is_empty() {
        page.push_text(order, text);
        order += 1;
    }

    for table in &detected {
        let markdown = cells_to_markdown(&table.rows);
        if !markdown.is_empty() {
            page.push_table(order, markdown);
            order += 1;
        }
    }

    let mut image_number = 0usize;
    for pdf_image in images::page_images(&doc, page_id) {
        if pdf_image.width < MIN_PDF_IMAGE_EDGE || pdf_image.height < MIN_PDF_IMAGE_EDGE {
            tracing::debug!(
                page_index,
                width = pdf_image.width,
                height = pdf_image.height,
                "skipping icon-sized page image"
            );
            continue;
        }

        let mut png = Vec::new();
        if pdf_image
            .image
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .is_err()
        {
            tracing::warn!(page_index, "failed to encode page image as PNG");
            continue;
        }

        image_number += 1;
        let path = temp_dir.join(format!("page_{page_index}_image_{image_number}.png"));
        if let Err(e) = std::fs::write(&path, &png) {
            tracing::warn!(path = %path.display(), error = %e, "failed to persist page image");
            continue;
        }

        if is_background(&png, Some(pdf_image.width), Some(pdf_image.height), max_image_bytes) {
            tracing::debug!(path = %path.display(), "background image rejected after save");
            let _ = std::fs::remove_file(&path);
            continue;
        }

        page.push_image(order, path);
        order += 1;
    }

    Ok(page)
}

fn load_document(source_path: &Path) -> Result<Document> {
    Document::load(source_path).map_err(|e| DocpulpError::extraction(format!("failed to load PDF: {e}")))
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Programmatic PDF builders shared by unit and integration tests.

    use lopdf::dictionary;
    use lopdf::{Dictionary, Document, Object, Stream};

    /// A page description for [`build_pdf`].
    pub struct PageSpec {
        /// Content-stream body (text/graphics operators).
        pub content: String,
        /// Raw RGB images to embed: (width, height, pixel bytes).
        pub images: Vec<(u32, u32, Vec<u8>)>,
    }

    impl PageSpec {
        pub fn text_only(text: &str) -> Self {
            Self {
                content: simple_text_content(text),
                images: Vec::new(),
            }
        }
    }

    /// `BT /F1 12 Tf 72 720 Td (text) Tj ET` with parentheses escaped.
    pub fn simple_text_content(text: &str) -> String {
        let escaped = text.replace('\\', "\\\\").replace('(', "\\(").replace(')', "\\)");
        format!("BT /F1 12 Tf 72 720 Td ({escaped}) Tj ET")
    }

    /// Build a PDF with Helvetica on every page and the given pages.
    pub fn build_pdf(pages: Vec<PageSpec>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut page_ids: Vec<Object> = Vec::new();
        for page in pages {
            let content_id = doc.add_object(Stream::new(Dictionary::new(), page.content.into_bytes()));

            let mut xobjects = Dictionary::new();
            for (index, (width, height, data)) in page.images.into_iter().enumerate() {
                let image_id = doc.add_object(Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => width as i64,
                        "Height" => height as i64,
                        "ColorSpace" => "DeviceRGB",
                        "BitsPerComponent" => 8,
                    },
                    data,
                ));
                xobjects.set(format!("Im{index}"), Object::Reference(image_id));
            }

            let mut resources = dictionary! {
                "Font" => dictionary! { "F1" => Object::Reference(font_id) },
            };
            if !xobjects.is_empty() {
                resources.set("XObject", Object::Dictionary(xobjects));
            }

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "MediaBox" => Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ]),
                "Contents" => Object::Reference(content_id),
                "Resources" => Object::Dictionary(resources),
            });
            page_ids.push(Object::Reference(page_id));
        }

        let page_count = page_ids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => page_ids,
                "Count" => page_count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("in-memory PDF save cannot fail");
        bytes
    }

    /// Solid-color raw RGB pixel payload.
    pub fn rgb_pixels(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&rgb);
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{build_pdf, rgb_pixels, simple_text_content, PageSpec};
    use super::*;
    use crate::types::FragmentKind;

    fn write_pdf(pages: Vec<PageSpec>) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), build_pdf(pages)).unwrap();
        file
    }

    #[test]
    fn test_count_pages() {
        let pdf = write_pdf(vec![PageSpec::text_only("one"), PageSpec::text_only("two")]);
        assert_eq!(count_pages(pdf.path()).unwrap(), 2);
    }

    #[test]
    fn test_extract_text_page() {
        let pdf = write_pdf(vec![PageSpec::text_only("Hello.")]);
        let tmp = tempfile::tempdir().unwrap();

        let page = extract_page(0, pdf.path(), tmp.path(), 300 * 1024).unwrap();
        assert_eq!(page.fragments.len(), 1);
        assert!(matches!(&page.fragments[0].kind, FragmentKind::Text(t) if t == "Hello."));
        assert!(page.image_refs.is_empty());
    }

    #[test]
    fn test_extract_ruled_table() {
        // A 2x2 ruled grid with one cell of text per cell, plus a caption
        // well above it.
        let mut content = String::from("BT /F1 12 Tf 72 740 Td (Caption text) Tj ET\n");
        // Grid lines: x at 100/200/300, y at 600/650/700.
        for y in [700, 650, 600] {
            content.push_str(&format!("100 {y} m 300 {y} l S\n"));
        }
        for x in [100, 200, 300] {
            content.push_str(&format!("{x} 600 m {x} 700 l S\n"));
        }
        for (x, y, cell) in [(110, 670, "A"), (210, 670, "B"), (110, 620, "1"), (210, 620, "2")] {
            content.push_str(&format!("BT /F1 10 Tf {x} {y} Td ({cell}) Tj ET\n"));
        }

        let pdf = write_pdf(vec![PageSpec {
            content,
            images: Vec::new(),
        }]);
        let tmp = tempfile::tempdir().unwrap();

        let page = extract_page(0, pdf.path(), tmp.path(), 300 * 1024).unwrap();
        let texts: Vec<&String> = page
            .fragments
            .iter()
            .filter_map(|f| match &f.kind {
                FragmentKind::Text(t) => Some(t),
                _ => None,
            })
            .collect();
        let markdowns: Vec<&String> = page
            .fragments
            .iter()
            .filter_map(|f| match &f.kind {
                FragmentKind::Table(t) => Some(t),
                _ => None,
            })
            .collect();

        assert_eq!(markdowns.len(), 1);
        assert_eq!(markdowns[0], "| A | B |\n| --- | --- |\n| 1 | 2 |\n");
        // Table cell text must not leak into the page text.
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].as_str(), "Caption text");
    }

    #[test]
    fn test_extract_page_image_survives_filter() {
        let pdf = write_pdf(vec![PageSpec {
            content: simple_text_content("With figure"),
            images: vec![(600, 400, rgb_pixels(600, 400, [200, 10, 10]))],
        }]);
        let tmp = tempfile::tempdir().unwrap();

        let page = extract_page(0, pdf.path(), tmp.path(), 300 * 1024).unwrap();
        assert_eq!(page.image_refs.len(), 1);
        let name = page.image_refs[0].file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, "page_0_image_1.png");
        assert!(page.image_refs[0].exists());
    }

    #[test]
    fn test_tiny_image_skipped() {
        let pdf = write_pdf(vec![PageSpec {
            content: simple_text_content("icon page"),
            images: vec![(20, 20, rgb_pixels(20, 20, [0, 0, 0]))],
        }]);
        let tmp = tempfile::tempdir().unwrap();

        let page = extract_page(0, pdf.path(), tmp.path(), 300 * 1024).unwrap();
        assert!(page.image_refs.is_empty());
    }

    #[test]
    fn test_background_image_deleted_after_save() {
        let pdf = write_pdf(vec![PageSpec {
            content: simple_text_content("background page"),
            images: vec![(1920, 1080, rgb_pixels(1920, 1080, [3, 3, 3]))],
        }]);
        let tmp = tempfile::tempdir().unwrap();

        let page = extract_page(0, pdf.path(), tmp.path(), 300 * 1024).unwrap();
        assert!(page.image_refs.is_empty());
        // The rejected file must not linger in the temp dir.
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_order_keys_monotonic() {
        let mut content = simple_text_content("text first");
        content.push('\n');
        for y in [700, 650, 600] {
            content.push_str(&format!("100 {y} m 300 {y} l S\n"));
        }
        for x in [100, 200, 300] {
            content.push_str(&format!("{x} 600 m {x} 700 l S\n"));
        }
        content.push_str("BT /F1 10 Tf 110 670 Td (C) Tj ET\n");

        let pdf = write_pdf(vec![PageSpec {
            content,
            images: vec![(600, 400, rgb_pixels(600, 400, [9, 9, 9]))],
        }]);
        let tmp = tempfile::tempdir().unwrap();

        let page = extract_page(0, pdf.path(), tmp.path(), 300 * 1024).unwrap();
        let orders: Vec<u32> = page.fragments.iter().map(|f| f.order).collect();
        let mut sorted = orders.clone();
        sorted.sort_unstable();
        assert_eq!(orders, sorted);
    }

    #[test]
    fn test_out_of_range_page_errors() {
        let pdf = write_pdf(vec![PageSpec::text_only("only page")]);
        let tmp = tempfile::tempdir().unwrap();
        assert!(extract_page(5, pdf.path(), tmp.path(), 300 * 1024).is_err());
    }

    #[test]
    fn test_invalid_pdf_errors() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not a pdf at all").unwrap();
        let tmp = tempfile::tempdir().unwrap();
        assert!(extract_page(0, file.path(), tmp.path(), 300 * 1024).is_err());
    }
}
