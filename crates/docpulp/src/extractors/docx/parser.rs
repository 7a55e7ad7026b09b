//! Streaming DOCX (WordprocessingML) parser.
//!
//! Walks `word/document.xml` with quick-xml, preserving body order so
//! paragraphs and tables interleave exactly as they appear in the document.
//! Inline drawings are recorded as relationship ids per paragraph and
//! resolved against `word/_rels/document.xml.rels`; the media bytes are read
//! from the archive on demand.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{DocpulpError, Result};

/// One body-level element, in document order.
#[derive(Debug, Clone)]
pub enum BodyItem {
    /// Paragraph text plus the relationship ids of any inline images.
    Paragraph { text: String, image_rel_ids: Vec<String> },
    /// Table cells; cell paragraphs are joined with `\n`.
    Table(Vec<Vec<String>>),
}

/// Parsed document body with its relationship map and archive handle, so
/// media parts can be read lazily.
pub struct DocxDocument {
    pub items: Vec<BodyItem>,
    relationships: HashMap<String, String>,
    archive: zip::ZipArchive<File>,
}

impl DocxDocument {
    /// Open and parse a DOCX file. The caller owns the handle; workers open
    /// their own copy of the source.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| DocpulpError::extraction(format!("failed to open DOCX archive: {e}")))?;

        let relationships = match read_archive_file(&mut archive, "word/_rels/document.xml.rels") {
            Ok(xml) => parse_relationships(&xml)?,
            Err(_) => HashMap::new(),
        };

        let document_xml = read_archive_file(&mut archive, "word/document.xml")?;
        let items = parse_body(&document_xml)?;

        Ok(Self {
            items,
            relationships,
            archive,
        })
    }

    /// Resolve a relationship id to the referenced media bytes.
    pub fn media_bytes(&mut self, rel_id: &str) -> Result<Vec<u8>> {
        let target = self
            .relationships
            .get(rel_id)
            .ok_or_else(|| DocpulpError::extraction(format!("unknown image relationship {rel_id}")))?
            .clone();

        let part = if let Some(stripped) = target.strip_prefix('/') {
            stripped.to_string()
        } else {
            format!("word/{target}")
        };

        let mut file = self
            .archive
            .by_name(&part)
            .map_err(|_| DocpulpError::extraction(format!("media part {part} not found")))?;
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

fn read_archive_file(archive: &mut zip::ZipArchive<File>, name: &str) -> Result<String> {
    let mut file = archive
        .by_name(name)
        .map_err(|_| DocpulpError::extraction(format!("{name} not found in DOCX")))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(contents)
}

/// Parse the relationship map (`rId` → target path).
fn parse_relationships(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);

    let mut map = HashMap::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"Relationship" {
                    let mut id = None;
                    let mut target = None;
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"Id" => id = Some(String::from_utf8_lossy(&attr.value).into_owned()),
                            b"Target" => target = Some(String::from_utf8_lossy(&attr.value).into_owned()),
                            _ => {}
                        }
                    }
                    if let (Some(id), Some(target)) = (id, target) {
                        map.insert(id, target);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DocpulpError::extraction(format!("relationship XML parse error: {e}")));
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(map)
}

/// Parse the document body into ordered items.
fn parse_body(xml: &str) -> Result<Vec<BodyItem>> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(false);

    let mut items = Vec::new();
    let mut buf = Vec::new();

    let mut paragraph_text = String::new();
    let mut paragraph_rel_ids: Vec<String> = Vec::new();
    let mut in_paragraph = false;
    let mut in_text = false;

    // Only top-level tables are collected; nested tables fold into the
    // containing cell.
    let mut table_depth = 0usize;
    let mut table_rows: Vec<Vec<String>> = Vec::new();
    let mut row_cells: Vec<String> = Vec::new();
    let mut cell_text = String::new();
    let mut cell_paragraph_open = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"w:tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        table_rows = Vec::new();
                    }
                }
                b"w:tr" if table_depth == 1 => row_cells = Vec::new(),
                b"w:tc" if table_depth == 1 => {
                    cell_text = String::new();
                    cell_paragraph_open = false;
                }
                b"w:p" => {
                    if table_depth > 0 {
                        if cell_paragraph_open {
                            cell_text.push('\n');
                        }
                        cell_paragraph_open = true;
                    } else {
                        in_paragraph = true;
                        paragraph_text = String::new();
                        paragraph_rel_ids = Vec::new();
                    }
                }
                b"w:t" => in_text = true,
                b"a:blip" => {
                    if table_depth == 0 && in_paragraph {
                        if let Some(rel_id) = blip_rel_id(e) {
                            paragraph_rel_ids.push(rel_id);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"a:blip" => {
                    if table_depth == 0 && in_paragraph {
                        if let Some(rel_id) = blip_rel_id(e) {
                            paragraph_rel_ids.push(rel_id);
                        }
                    }
                }
                b"w:br" | b"w:cr" => {
                    if table_depth > 0 {
                        cell_text.push('\n');
                    } else if in_paragraph {
                        paragraph_text.push('\n');
                    }
                }
                b"w:tab" => {
                    if table_depth > 0 {
                        cell_text.push('\t');
                    } else if in_paragraph {
                        paragraph_text.push('\t');
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text {
                    let text = e
                        .unescape()
                        .map_err(|err| DocpulpError::extraction(format!("document XML text error: {err}")))?;
                    if table_depth > 0 {
                        cell_text.push_str(&text);
                    } else if in_paragraph {
                        paragraph_text.push_str(&text);
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    if table_depth == 0 && in_paragraph {
                        in_paragraph = false;
                        items.push(BodyItem::Paragraph {
                            text: std::mem::take(&mut paragraph_text),
                            image_rel_ids: std::mem::take(&mut paragraph_rel_ids),
                        });
                    }
                }
                b"w:tc" if table_depth == 1 => row_cells.push(std::mem::take(&mut cell_text)),
                b"w:tr" if table_depth == 1 => table_rows.push(std::mem::take(&mut row_cells)),
                b"w:tbl" => {
                    if table_depth == 1 {
                        items.push(BodyItem::Table(std::mem::take(&mut table_rows)));
                    }
                    table_depth = table_depth.saturating_sub(1);
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DocpulpError::extraction(format!("document XML parse error: {e}")));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

/// Pull the image relationship id off an `a:blip`, preferring the embed
/// attribute with link as the fallback.
fn blip_rel_id(e: &quick_xml::events::BytesStart) -> Option<String> {
    let mut embed = None;
    let mut link = None;
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"r:embed" => embed = Some(String::from_utf8_lossy(&attr.value).into_owned()),
            b"r:link" => link = Some(String::from_utf8_lossy(&attr.value).into_owned()),
            _ => {}
        }
    }
    embed.or(link)
}

/// Lenient text-only parse used by the simple fallback path: paragraph
/// texts first, then table rows, with no images and best-effort recovery on
/// malformed XML.
pub fn parse_simple(xml: &str) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(false);

    let mut paragraphs = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();

    let mut buf = Vec::new();
    let mut in_text = false;
    let mut in_table = 0usize;
    let mut current = String::new();
    let mut current_cell = String::new();
    let mut current_row: Vec<String> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"w:tbl" => in_table += 1,
                b"w:tr" => current_row = Vec::new(),
                b"w:tc" => current_cell = String::new(),
                b"w:p" if in_table == 0 => current = String::new(),
                b"w:t" => in_text = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text {
                    if let Ok(text) = e.unescape() {
                        if in_table > 0 {
                            current_cell.push_str(&text);
                        } else {
                            current.push_str(&text);
                        }
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" if in_table == 0 => {
                    let text = current.trim().to_string();
                    if !text.is_empty() {
                        paragraphs.push(text);
                    }
                }
                b"w:tc" => current_row.push(std::mem::take(&mut current_cell)),
                b"w:tr" => rows.push(std::mem::take(&mut current_row)),
                b"w:tbl" => in_table = in_table.saturating_sub(1),
                _ => {}
            },
            Ok(Event::Eof) => break,
            // Keep whatever was recovered before the malformed region.
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    (paragraphs, rows)
}
