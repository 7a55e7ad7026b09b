//! PPTX package access: slide ordering, relationships and media parts.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{DocpulpError, Result};

/// An opened PPTX archive with its slides resolved in presentation order.
pub struct PptxContainer {
    archive: zip::ZipArchive<File>,
    slide_paths: Vec<String>,
}

impl PptxContainer {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| DocpulpError::extraction(format!("failed to open PPTX archive: {e}")))?;
        let slide_paths = resolve_slide_order(&mut archive)?;
        Ok(Self { archive, slide_paths })
    }

    pub fn slide_count(&self) -> usize {
        self.slide_paths.len()
    }

    /// Archive path of a slide, e.g. `ppt/slides/slide1.xml`.
    pub fn slide_path(&self, slide_index: usize) -> Result<&str> {
        self.slide_paths
            .get(slide_index)
            .map(String::as_str)
            .ok_or_else(|| DocpulpError::extraction_on_page("slide index out of range", slide_index))
    }

    pub fn slide_xml(&mut self, slide_index: usize) -> Result<String> {
        let path = self.slide_path(slide_index)?.to_string();
        read_part_string(&mut self.archive, &path)
    }

    /// Relationship map of a slide (`rId` → target), empty when the slide
    /// has no rels part.
    pub fn slide_rels(&mut self, slide_index: usize) -> Result<HashMap<String, String>> {
        let slide_path = self.slide_path(slide_index)?.to_string();
        let rels_path = rels_path_for(&slide_path);
        match read_part_string(&mut self.archive, &rels_path) {
            Ok(xml) => parse_rels(&xml),
            Err(_) => Ok(HashMap::new()),
        }
    }

    /// Speaker-notes XML for a slide, if its rels point at a notes part.
    pub fn notes_xml(&mut self, slide_index: usize, rels: &HashMap<String, String>) -> Option<String> {
        let slide_path = self.slide_path(slide_index).ok()?.to_string();
        let target = rels
            .values()
            .find(|target| target.contains("notesSlide"))?
            .clone();
        let part = resolve_target(&slide_path, &target);
        read_part_string(&mut self.archive, &part).ok()
    }

    /// Bytes of a media part referenced from a slide.
    pub fn media_bytes(&mut self, slide_index: usize, target: &str) -> Result<Vec<u8>> {
        let slide_path = self.slide_path(slide_index)?.to_string();
        let part = resolve_target(&slide_path, target);
        let mut file = self
            .archive
            .by_name(&part)
            .map_err(|_| DocpulpError::extraction(format!("media part {part} not found")))?;
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

fn read_part_string(archive: &mut zip::ZipArchive<File>, name: &str) -> Result<String> {
    let mut file = archive
        .by_name(name)
        .map_err(|_| DocpulpError::extraction(format!("{name} not found in PPTX")))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(contents)
}

/// `ppt/slides/slide1.xml` → `ppt/slides/_rels/slide1.xml.rels`.
fn rels_path_for(slide_path: &str) -> String {
    match slide_path.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{slide_path}.rels"),
    }
}

/// Resolve a (possibly `../`-relative) rels target against the slide's
/// directory.
fn resolve_target(slide_path: &str, target: &str) -> String {
    if let Some(stripped) = target.strip_prefix('/') {
        return stripped.to_string();
    }
    let base_dir = slide_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            ".." => {
                segments.pop();
            }
            "." | "" => {}
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn parse_rels(xml: &str) -> Result<HashMap<String, String>> {
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
            Err(e) => return Err(DocpulpError::extraction(format!("rels parse error: {e}"))),
            _ => {}
        }
        buf.clear();
    }
    Ok(map)
}

/// Determine slide order from `p:sldIdLst` in the presentation part,
/// resolved through the presentation rels. Falls back to numeric file-name
/// order when the presentation part is absent or empty.
fn resolve_slide_order(archive: &mut zip::ZipArchive<File>) -> Result<Vec<String>> {
    let ordered = (|| -> Result<Vec<String>> {
        let rels_xml = read_part_string(archive, "ppt/_rels/presentation.xml.rels")?;
        let rels = parse_rels(&rels_xml)?;
        let presentation_xml = read_part_string(archive, "ppt/presentation.xml")?;
        let rel_ids = parse_slide_id_list(&presentation_xml)?;

        let mut paths = Vec::with_capacity(rel_ids.len());
        for rel_id in rel_ids {
            if let Some(target) = rels.get(&rel_id) {
                paths.push(resolve_target("ppt/presentation.xml", target));
            }
        }
        Ok(paths)
    })();

    match ordered {
        Ok(paths) if !paths.is_empty() => Ok(paths),
        _ => Ok(slide_paths_by_number(archive)),
    }
}

/// `r:id` attributes of `p:sldId` elements, in document order.
fn parse_slide_id_list(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);

    let mut ids = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"sldId" {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"r:id" {
                            ids.push(String::from_utf8_lossy(&attr.value).into_owned());
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(DocpulpError::extraction(format!("presentation parse error: {e}"))),
            _ => {}
        }
        buf.clear();
    }
    Ok(ids)
}

fn slide_paths_by_number(archive: &mut zip::ZipArchive<File>) -> Vec<String> {
    let mut numbered: Vec<(u32, String)> = (0..archive.len())
        .filter_map(|i| {
            let name = archive.by_index(i).ok()?.name().to_string();
            let number = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse::<u32>()
                .ok()?;
            Some((number, name))
        })
        .collect();
    numbered.sort_by_key(|(n, _)| *n);
    numbered.into_iter().map(|(_, name)| name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rels_path_for() {
        assert_eq!(rels_path_for("ppt/slides/slide1.xml"), "ppt/slides/_rels/slide1.xml.rels");
        assert_eq!(rels_path_for("ppt/slides/slide10.xml"), "ppt/slides/_rels/slide10.xml.rels");
    }

    #[test]
    fn test_resolve_target_relative() {
        assert_eq!(
            resolve_target("ppt/slides/slide1.xml", "../media/image1.png"),
            "ppt/media/image1.png"
        );
        assert_eq!(
            resolve_target("ppt/slides/slide1.xml", "image1.png"),
            "ppt/slides/image1.png"
        );
        assert_eq!(
            resolve_target("ppt/presentation.xml", "slides/slide2.xml"),
            "ppt/slides/slide2.xml"
        );
        assert_eq!(resolve_target("ppt/slides/slide1.xml", "/ppt/media/x.png"), "ppt/media/x.png");
    }

    #[test]
    fn test_parse_slide_id_list_order() {
        let xml = r#"<p:presentation xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"
            xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
          <p:sldIdLst>
            <p:sldId id="257" r:id="rId3"/>
            <p:sldId id="256" r:id="rId2"/>
          </p:sldIdLst>
        </p:presentation>"#;
        assert_eq!(parse_slide_id_list(xml).unwrap(), vec!["rId3".to_string(), "rId2".to_string()]);
    }

    #[test]
    fn test_parse_rels() {
        let xml = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
          <Relationship Id="rId1" Type=".../slide" Target="slides/slide1.xml"/>
        </Relationships>"#;
        let map = parse_rels(xml).unwrap();
        assert_eq!(map.get("rId1").map(String::as_str), Some("slides/slide1.xml"));
    }
}
