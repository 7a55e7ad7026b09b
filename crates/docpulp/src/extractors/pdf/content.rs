//! PDF content-stream interpretation.
//!
//! Walks a page's decoded content stream and recovers the two things table
//! detection and text extraction need: positioned text spans (decoded
//! through each font's ToUnicode CMap when present) and stroked ruling
//! segments (lines and rectangle edges). Only the subset of the operator
//! set that affects those is interpreted; shading, clipping and color
//! operators are ignored.

use std::collections::HashMap;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::{DocpulpError, Result};

/// A run of show-text output with its device-space baseline origin.
#[derive(Debug, Clone)]
pub struct TextSpan {
    pub x: f64,
    pub y: f64,
    /// Effective font size after matrix scaling.
    pub size: f64,
    pub text: String,
}

impl TextSpan {
    /// Approximate vertical center of the glyphs, used for table-bbox
    /// exclusion tests.
    pub fn center_y(&self) -> f64 {
        self.y + self.size / 3.0
    }
}

/// An axis-aligned stroked segment. Diagonals are dropped: rulings are what
/// table detection wants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ruling {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Ruling {
    pub fn is_horizontal(&self) -> bool {
        (self.y1 - self.y0).abs() <= AXIS_TOLERANCE
    }

    pub fn is_vertical(&self) -> bool {
        (self.x1 - self.x0).abs() <= AXIS_TOLERANCE
    }
}

const AXIS_TOLERANCE: f64 = 2.0;

/// Everything the downstream stages need from one page.
#[derive(Debug, Default)]
pub struct PageContent {
    pub spans: Vec<TextSpan>,
    pub rulings: Vec<Ruling>,
}

#[derive(Debug, Clone, Copy)]
struct Matrix {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn translation(tx: f64, ty: f64) -> Matrix {
        Matrix {
            e: tx,
            f: ty,
            ..Matrix::IDENTITY
        }
    }

    /// `self * other` in PDF row-vector convention: applying the result is
    /// applying `self` first, then `other`.
    fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (self.a * x + self.c * y + self.e, self.b * x + self.d * y + self.f)
    }

    /// Scale factor along the y axis, used for effective font size.
    fn y_scale(&self) -> f64 {
        (self.b * self.b + self.d * self.d).sqrt()
    }
}

/// Per-font decoding information.
pub struct FontInfo {
    /// Composite (Type0) fonts consume two-byte codes.
    two_byte: bool,
    /// Code point → replacement text from the ToUnicode CMap.
    to_unicode: Option<HashMap<u32, String>>,
}

impl FontInfo {
    fn decode(&self, bytes: &[u8]) -> String {
        match &self.to_unicode {
            Some(map) => {
                let mut out = String::new();
                if self.two_byte {
                    for pair in bytes.chunks(2) {
                        let code = match pair {
                            [hi, lo] => u32::from(*hi) << 8 | u32::from(*lo),
                            [single] => u32::from(*single),
                            _ => continue,
                        };
                        if let Some(s) = map.get(&code) {
                            out.push_str(s);
                        }
                    }
                } else {
                    for &byte in bytes {
                        if let Some(s) = map.get(&u32::from(byte)) {
                            out.push_str(s);
                        } else {
                            out.push(byte as char);
                        }
                    }
                }
                out
            }
            None => {
                if self.two_byte {
                    // No mapping for a composite font: nothing sensible to
                    // recover.
                    String::new()
                } else {
                    bytes.iter().map(|&b| b as char).collect()
                }
            }
        }
    }
}

/// The page's resource dictionary, following the Parent chain for
/// inherited resources.
pub(super) fn page_resources(doc: &Document, page_id: ObjectId) -> Option<Dictionary> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    // Bounded walk: page trees are shallow and cycles would be malformed.
    for _ in 0..32 {
        if let Some(resources) = resolve_dict(doc, node.get(b"Resources").ok()) {
            return Some(resources.clone());
        }
        match node.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => node = doc.get_dictionary(*parent_id).ok()?,
            _ => return None,
        }
    }
    None
}

/// Load decoding info for every font in the page's resource dictionary.
pub fn load_page_fonts(doc: &Document, page_id: ObjectId) -> HashMap<Vec<u8>, FontInfo> {
    let mut fonts = HashMap::new();
    let resources = match page_resources(doc, page_id) {
        Some(dict) => dict,
        None => return fonts,
    };

    let font_dict = match resolve_dict(doc, resources.get(b"Font").ok()) {
        Some(dict) => dict,
        None => return fonts,
    };

    for (name, value) in font_dict.iter() {
        let font = match resolve_dict(doc, Some(value)) {
            Some(dict) => dict,
            None => continue,
        };
        let two_byte = matches!(font.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Type0");
        let to_unicode = font
            .get(b"ToUnicode")
            .ok()
            .and_then(|obj| resolve_stream_bytes(doc, obj))
            .map(|bytes| parse_tounicode_cmap(&bytes));
        fonts.insert(name.clone(), FontInfo { two_byte, to_unicode });
    }
    fonts
}

pub(super) fn resolve_dict<'a>(doc: &'a Document, obj: Option<&'a Object>) -> Option<&'a Dictionary> {
    match obj? {
        Object::Dictionary(dict) => Some(dict),
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        _ => None,
    }
}

fn resolve_stream_bytes(doc: &Document, obj: &Object) -> Option<Vec<u8>> {
    let stream = match obj {
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Stream(stream) => stream,
            _ => return None,
        },
        Object::Stream(stream) => stream,
        _ => return None,
    };
    stream
        .decompressed_content()
        .ok()
        .or_else(|| Some(stream.content.clone()))
}

/// Parse the `bfchar`/`bfrange` sections of a ToUnicode CMap.
fn parse_tounicode_cmap(bytes: &[u8]) -> HashMap<u32, String> {
    let text = String::from_utf8_lossy(bytes);
    let mut map = HashMap::new();

    let mut rest = text.as_ref();
    while let Some(start) = rest.find("beginbfchar") {
        let section = &rest[start + "beginbfchar".len()..];
        let end = section.find("endbfchar").unwrap_or(section.len());
        let body = &section[..end];
        let tokens = hex_tokens(body);
        for pair in tokens.chunks(2) {
            if let [src, dst] = pair {
                if let (Some(code), Some(text)) = (hex_to_code(src), hex_to_utf16_string(dst)) {
                    map.insert(code, text);
                }
            }
        }
        rest = &section[end..];
    }

    let mut rest = text.as_ref();
    while let Some(start) = rest.find("beginbfrange") {
        let section = &rest[start + "beginbfrange".len()..];
        let end = section.find("endbfrange").unwrap_or(section.len());
        let body = &section[..end];
        let tokens = hex_tokens(body);
        for triple in tokens.chunks(3) {
            let [lo, hi, dst] = triple else { break };
            let (Some(lo), Some(hi)) = (hex_to_code(lo), hex_to_code(hi)) else {
                continue;
            };
            let Some(base_text) = hex_to_utf16_string(dst) else {
                continue;
            };
            // The destination steps by incrementing its last UTF-16 unit,
            // which is the form every common writer emits.
            let units: Vec<u16> = base_text.encode_utf16().collect();
            let Some(&base_last) = units.last() else { continue };
            for (offset, code) in (lo..=hi.min(lo + 0xFFFF)).enumerate() {
                let mut stepped = units.clone();
                if let Some(last) = stepped.last_mut() {
                    *last = base_last.wrapping_add(offset as u16);
                }
                if let Ok(s) = String::from_utf16(&stepped) {
                    map.insert(code, s);
                }
            }
        }
        rest = &section[end..];
    }

    map
}

fn hex_tokens(body: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '<' {
            let mut token = String::new();
            for inner in chars.by_ref() {
                if inner == '>' {
                    break;
                }
                if inner.is_ascii_hexdigit() {
                    token.push(inner);
                }
            }
            tokens.push(token);
        }
    }
    tokens
}

fn hex_to_code(token: &str) -> Option<u32> {
    u32::from_str_radix(token, 16).ok()
}

fn hex_to_utf16_string(token: &str) -> Option<String> {
    if token.len() % 4 != 0 || token.is_empty() {
        // Single-byte destination codes appear in some writers.
        return u8::from_str_radix(token, 16).ok().map(|b| (b as char).to_string());
    }
    let mut units = Vec::with_capacity(token.len() / 4);
    for chunk in token.as_bytes().chunks(4) {
        let s = std::str::from_utf8(chunk).ok()?;
        units.push(u16::from_str_radix(s, 16).ok()?);
    }
    String::from_utf16(&units).ok()
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Interpret a page's content stream.
pub fn interpret_page(doc: &Document, page_id: ObjectId) -> Result<PageContent> {
    let content_data = doc
        .get_page_content(page_id)
        .map_err(|e| DocpulpError::extraction(format!("failed to read page content: {e}")))?;
    let content = Content::decode(&content_data)
        .map_err(|e| DocpulpError::extraction(format!("failed to decode content stream: {e}")))?;
    let fonts = load_page_fonts(doc, page_id);

    let mut page = PageContent::default();

    let mut ctm = Matrix::IDENTITY;
    let mut ctm_stack: Vec<Matrix> = Vec::new();

    let mut text_matrix = Matrix::IDENTITY;
    let mut line_matrix = Matrix::IDENTITY;
    let mut leading = 0.0f64;
    let mut font_size = 0.0f64;
    let mut current_font: Option<Vec<u8>> = None;

    // Current path as raw segments; committed on stroke/fill.
    let mut path_segments: Vec<Ruling> = Vec::new();
    let mut current_point: Option<(f64, f64)> = None;

    for op in &content.operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "q" => ctm_stack.push(ctm),
            "Q" => ctm = ctm_stack.pop().unwrap_or(Matrix::IDENTITY),
            "cm" => {
                if let [a, b, c, d, e, f] = operands.as_slice() {
                    if let (Some(a), Some(b), Some(c), Some(d), Some(e), Some(f)) =
                        (number(a), number(b), number(c), number(d), number(e), number(f))
                    {
                        ctm = Matrix { a, b, c, d, e, f }.then(&ctm);
                    }
                }
            }
            "BT" => {
                text_matrix = Matrix::IDENTITY;
                line_matrix = Matrix::IDENTITY;
            }
            "ET" => {}
            "Tf" => {
                if let [Object::Name(name), size] = operands.as_slice() {
                    current_font = Some(name.clone());
                    font_size = number(size).unwrap_or(font_size);
                }
            }
            "TL" => leading = operands.first().and_then(number).unwrap_or(leading),
            "Td" => {
                if let [tx, ty] = operands.as_slice() {
                    if let (Some(tx), Some(ty)) = (number(tx), number(ty)) {
                        line_matrix = Matrix::translation(tx, ty).then(&line_matrix);
                        text_matrix = line_matrix;
                    }
                }
            }
            "TD" => {
                if let [tx, ty] = operands.as_slice() {
                    if let (Some(tx), Some(ty)) = (number(tx), number(ty)) {
                        leading = -ty;
                        line_matrix = Matrix::translation(tx, ty).then(&line_matrix);
                        text_matrix = line_matrix;
                    }
                }
            }
            "Tm" => {
                if let [a, b, c, d, e, f] = operands.as_slice() {
                    if let (Some(a), Some(b), Some(c), Some(d), Some(e), Some(f)) =
                        (number(a), number(b), number(c), number(d), number(e), number(f))
                    {
                        line_matrix = Matrix { a, b, c, d, e, f };
                        text_matrix = line_matrix;
                    }
                }
            }
            "T*" => {
                line_matrix = Matrix::translation(0.0, -leading).then(&line_matrix);
                text_matrix = line_matrix;
            }
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    show_text(&mut page, &fonts, &current_font, bytes, &text_matrix, &ctm, font_size);
                }
            }
            "'" => {
                line_matrix = Matrix::translation(0.0, -leading).then(&line_matrix);
                text_matrix = line_matrix;
                if let Some(Object::String(bytes, _)) = operands.first() {
                    show_text(&mut page, &fonts, &current_font, bytes, &text_matrix, &ctm, font_size);
                }
            }
            "\"" => {
                line_matrix = Matrix::translation(0.0, -leading).then(&line_matrix);
                text_matrix = line_matrix;
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    show_text(&mut page, &fonts, &current_font, bytes, &text_matrix, &ctm, font_size);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    let mut combined = Vec::new();
                    for item in items {
                        if let Object::String(bytes, _) = item {
                            combined.extend_from_slice(bytes);
                        }
                    }
                    show_text(&mut page, &fonts, &current_font, &combined, &text_matrix, &ctm, font_size);
                }
            }
            "m" => {
                if let [x, y] = operands.as_slice() {
                    if let (Some(x), Some(y)) = (number(x), number(y)) {
                        current_point = Some(ctm.apply(x, y));
                    }
                }
            }
            "l" => {
                if let [x, y] = operands.as_slice() {
                    if let (Some(x), Some(y)) = (number(x), number(y)) {
                        let to = ctm.apply(x, y);
                        if let Some(from) = current_point {
                            path_segments.push(Ruling {
                                x0: from.0,
                                y0: from.1,
                                x1: to.0,
                                y1: to.1,
                            });
                        }
                        current_point = Some(to);
                    }
                }
            }
            "re" => {
                if let [x, y, w, h] = operands.as_slice() {
                    if let (Some(x), Some(y), Some(w), Some(h)) = (number(x), number(y), number(w), number(h)) {
                        let corners = [
                            ctm.apply(x, y),
                            ctm.apply(x + w, y),
                            ctm.apply(x + w, y + h),
                            ctm.apply(x, y + h),
                        ];
                        for i in 0..4 {
                            let from = corners[i];
                            let to = corners[(i + 1) % 4];
                            path_segments.push(Ruling {
                                x0: from.0,
                                y0: from.1,
                                x1: to.0,
                                y1: to.1,
                            });
                        }
                        current_point = Some(corners[0]);
                    }
                }
            }
            // Painting operators commit the pending path.
            "S" | "s" | "B" | "B*" | "b" | "b*" | "f" | "F" | "f*" => {
                commit_segments(&mut page, &mut path_segments);
                current_point = None;
            }
            "n" => {
                path_segments.clear();
                current_point = None;
            }
            _ => {}
        }
    }

    Ok(page)
}

fn commit_segments(page: &mut PageContent, segments: &mut Vec<Ruling>) {
    for segment in segments.drain(..) {
        let normalized = normalize(segment);
        if normalized.is_horizontal() || normalized.is_vertical() {
            page.rulings.push(normalized);
        }
    }
}

fn normalize(r: Ruling) -> Ruling {
    let (x0, x1) = if r.x0 <= r.x1 { (r.x0, r.x1) } else { (r.x1, r.x0) };
    let (y0, y1) = if r.y0 <= r.y1 { (r.y0, r.y1) } else { (r.y1, r.y0) };
    Ruling { x0, y0, x1, y1 }
}

#[allow(clippy::too_many_arguments)]
fn show_text(
    page: &mut PageContent,
    fonts: &HashMap<Vec<u8>, FontInfo>,
    current_font: &Option<Vec<u8>>,
    bytes: &[u8],
    text_matrix: &Matrix,
    ctm: &Matrix,
    font_size: f64,
) {
    if bytes.is_empty() {
        return;
    }
    let text = match current_font.as_ref().and_then(|name| fonts.get(name)) {
        Some(font) => font.decode(bytes),
        None => bytes.iter().map(|&b| b as char).collect(),
    };
    if text.trim().is_empty() {
        return;
    }

    let render = text_matrix.then(ctm);
    let (x, y) = render.apply(0.0, 0.0);
    let size = font_size * render.y_scale();
    page.spans.push(TextSpan { x, y, size, text });
}
