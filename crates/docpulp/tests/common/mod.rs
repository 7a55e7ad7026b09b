//! Shared fixtures: in-memory document builders and stub OCR services.

// Each test target links its own copy of this module and uses a subset of
// the helpers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;

use async_trait::async_trait;
use docpulp::ocr::OcrService;
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use zip::write::SimpleFileOptions;

/// OCR stub that resolves images by their byte length.
pub struct MapOcr {
    by_len: HashMap<usize, String>,
}

impl MapOcr {
    pub fn new(entries: &[(usize, &str)]) -> Self {
        Self {
            by_len: entries.iter().map(|(len, text)| (*len, text.to_string())).collect(),
        }
    }
}

#[async_trait]
impl OcrService for MapOcr {
    async fn recognize(&self, image: Vec<u8>) -> String {
        self.by_len.get(&image.len()).cloned().unwrap_or_default()
    }
}

/// OCR stub that answers every image with the same text.
pub struct FixedOcr(pub &'static str);

#[async_trait]
impl OcrService for FixedOcr {
    async fn recognize(&self, _image: Vec<u8>) -> String {
        self.0.to_string()
    }
}

// --- DOCX ---

pub fn docx_document_xml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"
            xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"
            xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<w:body>{body}</w:body></w:document>"#
    )
}

pub fn docx_paragraph(text: &str) -> String {
    format!("<w:p><w:r><w:t>{text}</w:t></w:r></w:p>")
}

pub fn docx_table(rows: &[&[&str]]) -> String {
    let mut xml = String::from("<w:tbl>");
    for row in rows {
        xml.push_str("<w:tr>");
        for cell in *row {
            xml.push_str(&format!("<w:tc><w:p><w:r><w:t>{cell}</w:t></w:r></w:p></w:tc>"));
        }
        xml.push_str("</w:tr>");
    }
    xml.push_str("</w:tbl>");
    xml
}

/// Zip the given parts into DOCX bytes.
pub fn build_docx(body: &str) -> Vec<u8> {
    build_zip(&[("word/document.xml", docx_document_xml(body).as_bytes())])
}

// --- PPTX ---

pub struct PptxFixture {
    parts: Vec<(String, Vec<u8>)>,
}

impl PptxFixture {
    pub fn new() -> Self {
        Self { parts: Vec::new() }
    }

    pub fn slide(mut self, number: usize, shapes: &str) -> Self {
        let xml = format!(
            r#"<?xml version="1.0"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"
       xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"
       xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <p:cSld><p:spTree>{shapes}</p:spTree></p:cSld>
</p:sld>"#
        );
        self.parts.push((format!("ppt/slides/slide{number}.xml"), xml.into_bytes()));
        self
    }

    pub fn raw_part(mut self, name: &str, data: impl Into<Vec<u8>>) -> Self {
        self.parts.push((name.to_string(), data.into()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let borrowed: Vec<(&str, &[u8])> = self
            .parts
            .iter()
            .map(|(name, data)| (name.as_str(), data.as_slice()))
            .collect();
        build_zip(&borrowed)
    }
}

pub fn pptx_title(text: &str) -> String {
    format!(
        r#"<p:sp><p:nvSpPr><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr>
           <p:txBody><a:p><a:r><a:t>{text}</a:t></a:r></a:p></p:txBody></p:sp>"#
    )
}

pub fn pptx_picture(rel_id: &str, width_px: u32, height_px: u32) -> String {
    let cx = width_px as u64 * 9525;
    let cy = height_px as u64 * 9525;
    format!(
        r#"<p:pic><p:blipFill><a:blip r:embed="{rel_id}"/></p:blipFill>
           <p:spPr><a:xfrm><a:ext cx="{cx}" cy="{cy}"/></a:xfrm></p:spPr></p:pic>"#
    )
}

pub fn pptx_image_rels(entries: &[(&str, &str)]) -> String {
    let mut xml = String::from(
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for (id, target) in entries {
        xml.push_str(&format!(r#"<Relationship Id="{id}" Type=".../image" Target="{target}"/>"#));
    }
    xml.push_str("</Relationships>");
    xml
}

// --- PDF ---

pub struct PdfPage {
    pub content: String,
    pub images: Vec<(u32, u32, Vec<u8>)>,
}

impl PdfPage {
    pub fn text(text: &str) -> Self {
        let escaped = text.replace('\\', "\\\\").replace('(', "\\(").replace(')', "\\)");
        Self {
            content: format!("BT /F1 12 Tf 72 720 Td ({escaped}) Tj ET"),
            images: Vec::new(),
        }
    }

    pub fn image_only(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&rgb);
        }
        Self {
            content: String::new(),
            images: vec![(width, height, data)],
        }
    }
}

/// Build a minimal, valid PDF with Helvetica on every page.
pub fn build_pdf(pages: Vec<PdfPage>) -> Vec<u8> {
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

fn build_zip(parts: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buffer = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buffer));
        let options = SimpleFileOptions::default();
        for (name, data) in parts {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }
    buffer
}

/// A deterministic pseudo-random payload of the requested size (headerless,
/// so the background filter keeps it and pool stubs can key on length).
pub fn noisy_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i.wrapping_mul(31) % 251) as u8).collect()
}
