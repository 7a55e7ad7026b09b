//! Slide XML parsing: shapes in native order.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{DocpulpError, Result};

/// EMU per pixel at 96 dpi.
const EMU_PER_PIXEL: i64 = 9525;

/// One shape of a slide, in tree order.
#[derive(Debug, Clone, PartialEq)]
pub enum SlideElement {
    Text { text: String, is_title: bool },
    Table(Vec<Vec<String>>),
    Picture {
        rel_id: String,
        width_px: Option<u32>,
        height_px: Option<u32>,
    },
}

/// Parse a slide's shape tree. Shapes whose type cannot be read are skipped
/// with a debug log rather than failing the slide.
pub fn parse_slide_xml(xml: &str) -> Result<Vec<SlideElement>> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(false);

    let mut elements = Vec::new();
    let mut buf = Vec::new();

    // Shape (p:sp) state.
    let mut sp_depth = 0usize;
    let mut sp_is_title = false;
    let mut sp_text = String::new();
    let mut sp_paragraph_open = false;

    // Picture (p:pic) state.
    let mut in_pic = false;
    let mut pic_rel_id: Option<String> = None;
    let mut pic_ext: Option<(i64, i64)> = None;

    // Table (a:tbl) state.
    let mut in_table = false;
    let mut table_rows: Vec<Vec<String>> = Vec::new();
    let mut row_cells: Vec<String> = Vec::new();
    let mut cell_text = String::new();
    let mut cell_paragraph_open = false;

    let mut in_text_run = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"p:sp" => {
                    sp_depth += 1;
                    if sp_depth == 1 {
                        sp_is_title = false;
                        sp_text = String::new();
                        sp_paragraph_open = false;
                    }
                }
                b"p:pic" => {
                    in_pic = true;
                    pic_rel_id = None;
                    pic_ext = None;
                }
                b"a:tbl" => {
                    in_table = true;
                    table_rows = Vec::new();
                }
                b"a:tr" if in_table => row_cells = Vec::new(),
                b"a:tc" if in_table => {
                    cell_text = String::new();
                    cell_paragraph_open = false;
                }
                b"a:p" => {
                    if in_table {
                        if cell_paragraph_open {
                            cell_text.push('\n');
                        }
                        cell_paragraph_open = true;
                    } else if sp_depth > 0 {
                        if sp_paragraph_open {
                            sp_text.push('\n');
                        }
                        sp_paragraph_open = true;
                    }
                }
                b"a:t" => in_text_run = true,
                b"p:ph" => {
                    if sp_depth > 0 && placeholder_is_title(e) {
                        sp_is_title = true;
                    }
                }
                b"a:blip" if in_pic => {
                    if let Some(rel_id) = blip_rel_id(e) {
                        pic_rel_id = Some(rel_id);
                    }
                }
                b"a:ext" if in_pic => pic_ext = parse_extent(e).or(pic_ext),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"p:ph" => {
                    if sp_depth > 0 && placeholder_is_title(e) {
                        sp_is_title = true;
                    }
                }
                b"a:blip" if in_pic => {
                    if let Some(rel_id) = blip_rel_id(e) {
                        pic_rel_id = Some(rel_id);
                    }
                }
                b"a:ext" if in_pic => pic_ext = parse_extent(e).or(pic_ext),
                b"a:br" => {
                    if in_table {
                        cell_text.push('\n');
                    } else if sp_depth > 0 {
                        sp_text.push('\n');
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_run {
                    let text = e
                        .unescape()
                        .map_err(|err| DocpulpError::extraction(format!("slide XML text error: {err}")))?;
                    if in_table {
                        cell_text.push_str(&text);
                    } else if sp_depth > 0 {
                        sp_text.push_str(&text);
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"a:t" => in_text_run = false,
                b"a:tc" if in_table => row_cells.push(std::mem::take(&mut cell_text)),
                b"a:tr" if in_table => table_rows.push(std::mem::take(&mut row_cells)),
                b"a:tbl" => {
                    if in_table {
                        elements.push(SlideElement::Table(std::mem::take(&mut table_rows)));
                        in_table = false;
                    }
                }
                b"p:pic" => {
                    in_pic = false;
                    match pic_rel_id.take() {
                        Some(rel_id) => {
                            let (width_px, height_px) = match pic_ext.take() {
                                Some((cx, cy)) => (emu_to_px(cx), emu_to_px(cy)),
                                None => (None, None),
                            };
                            elements.push(SlideElement::Picture {
                                rel_id,
                                width_px,
                                height_px,
                            });
                        }
                        None => tracing::debug!("picture shape without blip reference, skipping"),
                    }
                }
                b"p:sp" => {
                    if sp_depth == 1 {
                        let text = sp_text.trim().to_string();
                        if !text.is_empty() {
                            elements.push(SlideElement::Text {
                                text,
                                is_title: sp_is_title,
                            });
                        }
                    }
                    sp_depth = sp_depth.saturating_sub(1);
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(DocpulpError::extraction(format!("slide XML parse error: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    Ok(elements)
}

fn placeholder_is_title(e: &BytesStart) -> bool {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == b"type" {
            return matches!(attr.value.as_ref(), b"title" | b"ctrTitle");
        }
    }
    false
}

fn blip_rel_id(e: &BytesStart) -> Option<String> {
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

fn parse_extent(e: &BytesStart) -> Option<(i64, i64)> {
    let mut cx = None;
    let mut cy = None;
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"cx" => cx = std::str::from_utf8(&attr.value).ok()?.parse().ok(),
            b"cy" => cy = std::str::from_utf8(&attr.value).ok()?.parse().ok(),
            _ => {}
        }
    }
    Some((cx?, cy?))
}

fn emu_to_px(emu: i64) -> Option<u32> {
    if emu <= 0 {
        return None;
    }
    u32::try_from(emu / EMU_PER_PIXEL).ok()
}

/// Extract speaker-notes text: every paragraph of every text body, joined
/// with newlines.
pub fn parse_notes_xml(xml: &str) -> Result<String> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut text = String::new();
    let mut in_text_run = false;
    let mut paragraph_open = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"a:p" => {
                    if paragraph_open {
                        text.push('\n');
                    }
                    paragraph_open = true;
                }
                b"a:t" => in_text_run = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_run {
                    let chunk = e
                        .unescape()
                        .map_err(|err| DocpulpError::extraction(format!("notes XML text error: {err}")))?;
                    text.push_str(&chunk);
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"a:t" {
                    in_text_run = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(DocpulpError::extraction(format!("notes XML parse error: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    Ok(text.trim().to_string())
}
