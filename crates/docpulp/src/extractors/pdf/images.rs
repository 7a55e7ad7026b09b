//! Embedded PDF image extraction.
//!
//! Enumerates a page's image XObjects and decodes the common encodings
//! (DCT/JPEG, Flate-compressed RGB or grayscale rasters). Streams behind
//! other filter chains are skipped with a debug log; rasterizing page
//! regions is out of scope.

use image::DynamicImage;
use lopdf::{Dictionary, Document, Object, ObjectId};

/// One decodable image on a page.
pub struct PdfPageImage {
    pub width: u32,
    pub height: u32,
    pub image: DynamicImage,
}

/// Decode every image XObject on the page.
pub fn page_images(doc: &Document, page_id: ObjectId) -> Vec<PdfPageImage> {
    let mut images = Vec::new();

    let resources = match super::content::page_resources(doc, page_id) {
        Some(dict) => dict,
        None => return images,
    };

    let xobjects = match super::content::resolve_dict(doc, resources.get(b"XObject").ok()) {
        Some(dict) => dict.clone(),
        None => return images,
    };

    for (name, value) in xobjects.iter() {
        let stream = match value {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(Object::Stream(stream)) => stream.clone(),
                _ => continue,
            },
            Object::Stream(stream) => stream.clone(),
            _ => continue,
        };

        if !matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image") {
            continue;
        }

        let width = dict_u32(&stream.dict, b"Width");
        let height = dict_u32(&stream.dict, b"Height");
        let (Some(width), Some(height)) = (width, height) else {
            continue;
        };

        match decode_image_stream(doc, &stream, width, height) {
            Some(image) => images.push(PdfPageImage { width, height, image }),
            None => {
                tracing::debug!(
                    name = %String::from_utf8_lossy(name),
                    "undecodable image stream filter chain, skipping"
                );
            }
        }
    }

    images
}

fn decode_image_stream(doc: &Document, stream: &lopdf::Stream, width: u32, height: u32) -> Option<DynamicImage> {
    let filters = filter_names(&stream.dict);

    if filters.iter().any(|f| f == "DCTDecode") {
        // JPEG payload; the decoder consumes the stream bytes directly.
        return image::load_from_memory(&stream.content).ok();
    }

    let data = if filters.is_empty() {
        stream.content.clone()
    } else if filters.iter().all(|f| f == "FlateDecode") {
        stream.decompressed_content().ok()?
    } else {
        return None;
    };

    let bits = dict_u32(&stream.dict, b"BitsPerComponent").unwrap_or(8);
    if bits != 8 {
        return None;
    }

    match color_space_name(doc, &stream.dict)?.as_str() {
        "DeviceRGB" => {
            let buffer = image::ImageBuffer::<image::Rgb<u8>, Vec<u8>>::from_raw(width, height, data)?;
            Some(DynamicImage::ImageRgb8(buffer))
        }
        "DeviceGray" => {
            let buffer = image::ImageBuffer::<image::Luma<u8>, Vec<u8>>::from_raw(width, height, data)?;
            Some(DynamicImage::ImageLuma8(buffer))
        }
        _ => None,
    }
}

fn filter_names(dict: &Dictionary) -> Vec<String> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![String::from_utf8_lossy(name).into_owned()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|o| match o {
                Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn color_space_name(doc: &Document, dict: &Dictionary) -> Option<String> {
    match dict.get(b"ColorSpace") {
        Ok(Object::Name(name)) => Some(String::from_utf8_lossy(name).into_owned()),
        Ok(Object::Reference(id)) => match doc.get_object(*id).ok()? {
            Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
            _ => None,
        },
        _ => None,
    }
}

fn dict_u32(dict: &Dictionary, key: &[u8]) -> Option<u32> {
    match dict.get(key) {
        Ok(Object::Integer(i)) => u32::try_from(*i).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Stream;

    fn rgb_stream(width: u32, height: u32) -> Stream {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"XObject".to_vec()));
        dict.set("Subtype", Object::Name(b"Image".to_vec()));
        dict.set("Width", Object::Integer(width as i64));
        dict.set("Height", Object::Integer(height as i64));
        dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
        dict.set("BitsPerComponent", Object::Integer(8));
        let data = vec![127u8; (width * height * 3) as usize];
        Stream::new(dict, data)
    }

    #[test]
    fn test_decode_raw_rgb_stream() {
        let doc = Document::with_version("1.5");
        let stream = rgb_stream(4, 2);
        let image = decode_image_stream(&doc, &stream, 4, 2).unwrap();
        assert_eq!((image.width(), image.height()), (4, 2));
    }

    #[test]
    fn test_unsupported_filter_skipped() {
        let doc = Document::with_version("1.5");
        let mut stream = rgb_stream(4, 2);
        stream.dict.set("Filter", Object::Name(b"JPXDecode".to_vec()));
        assert!(decode_image_stream(&doc, &stream, 4, 2).is_none());
    }

    #[test]
    fn test_wrong_payload_size_skipped() {
        let doc = Document::with_version("1.5");
        let mut stream = rgb_stream(4, 2);
        stream.content = vec![0u8; 5];
        assert!(decode_image_stream(&doc, &stream, 4, 2).is_none());
    }

    #[test]
    fn test_filter_names_array() {
        let mut dict = Dictionary::new();
        dict.set(
            "Filter",
            Object::Array(vec![
                Object::Name(b"FlateDecode".to_vec()),
                Object::Name(b"DCTDecode".to_vec()),
            ]),
        );
        assert_eq!(filter_names(&dict), vec!["FlateDecode", "DCTDecode"]);
    }
}
