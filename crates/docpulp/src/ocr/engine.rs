//! OCR runtime adapter.
//!
//! Wraps the recognition engine behind a process-wide lazy singleton. The
//! engine is not fork-safe and does not tolerate concurrent callers from
//! multiple threads of one process, so this module is only ever exercised
//! inside spawned worker processes (see [`crate::ocr::worker`]); the pool
//! side never touches it.

use std::path::Path;
use std::sync::OnceLock;

use image::DynamicImage;

use crate::error::{DocpulpError, Result};

/// Images with a longer edge above this are downscaled before recognition.
const MAX_IMAGE_EDGE: u32 = 4096;

/// Images smaller than this on both edges are passed through untouched;
/// upscaling never helps recognition.
const MIN_IMAGE_EDGE: u32 = 32;

const DETECTION_MODEL: &str = "text-detection.rten";
const RECOGNITION_MODEL: &str = "text-recognition.rten";

static RUNTIME: OnceLock<std::result::Result<OcrRuntime, String>> = OnceLock::new();

/// A loaded recognition engine. Recognition is callable repeatedly on the
/// same instance.
pub struct OcrRuntime {
    engine: ocrs::OcrEngine,
}

impl std::fmt::Debug for OcrRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrRuntime").finish_non_exhaustive()
    }
}

impl OcrRuntime {
    /// Load models from `model_dir` and construct the engine.
    pub fn initialize(model_dir: &Path) -> Result<Self> {
        let avx = detect_avx();
        if avx {
            tracing::info!(pid = std::process::id(), "initializing OCR engine (AVX available)");
        } else {
            tracing::warn!(
                pid = std::process::id(),
                "CPU does not support AVX, OCR throughput may be limited"
            );
        }

        let detection_path = model_dir.join(DETECTION_MODEL);
        let recognition_path = model_dir.join(RECOGNITION_MODEL);

        let detection_model = rten::Model::load_file(&detection_path).map_err(|e| {
            DocpulpError::ocr_engine(format!("failed to load {}: {e}", detection_path.display()))
        })?;
        let recognition_model = rten::Model::load_file(&recognition_path).map_err(|e| {
            DocpulpError::ocr_engine(format!("failed to load {}: {e}", recognition_path.display()))
        })?;

        let engine = ocrs::OcrEngine::new(ocrs::OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|e| DocpulpError::ocr_engine(format!("failed to construct OCR engine: {e}")))?;

        tracing::info!(pid = std::process::id(), "OCR engine initialized");
        Ok(Self { engine })
    }

    /// Decode, normalize and recognize one image. Returns the recognized
    /// lines joined with `\n`; an image without text yields an empty string.
    /// No retries are attempted.
    pub fn recognize(&self, image_bytes: &[u8]) -> Result<String> {
        let rgb = preprocess(image_bytes)?.to_rgb8();
        let (width, height) = rgb.dimensions();

        let source = ocrs::ImageSource::from_bytes(rgb.as_raw(), (width, height))
            .map_err(|e| DocpulpError::image_decode(format!("failed to convert image: {e}")))?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|e| DocpulpError::ocr_engine(format!("failed to prepare input: {e}")))?;
        let text = self
            .engine
            .get_text(&input)
            .map_err(|e| DocpulpError::ocr_engine(format!("recognition failed: {e}")))?;

        let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        Ok(lines.join("\n"))
    }
}

/// Get the per-process engine singleton, initializing it on first use.
/// Initialization failure is cached so later calls fail fast with the same
/// message.
pub fn global_runtime(model_dir: &Path) -> Result<&'static OcrRuntime> {
    let slot = RUNTIME.get_or_init(|| OcrRuntime::initialize(model_dir).map_err(|e| e.to_string()));
    match slot {
        Ok(runtime) => Ok(runtime),
        Err(message) => Err(DocpulpError::ocr_engine(message.clone())),
    }
}

/// Decode bytes, convert to RGB and downscale oversized images.
fn preprocess(image_bytes: &[u8]) -> Result<DynamicImage> {
    let decoded = image::load_from_memory(image_bytes)
        .map_err(|e| DocpulpError::image_decode(format!("failed to decode image: {e}")))?;

    let (width, height) = (decoded.width(), decoded.height());
    let longest = width.max(height);

    if longest <= MAX_IMAGE_EDGE || (width < MIN_IMAGE_EDGE && height < MIN_IMAGE_EDGE) {
        return Ok(decoded);
    }

    let scale = MAX_IMAGE_EDGE as f64 / longest as f64;
    let new_width = ((width as f64 * scale) as u32).max(1);
    let new_height = ((height as f64 * scale) as u32).max(1);
    tracing::debug!(width, height, new_width, new_height, "downscaling image for OCR");
    resize_lanczos(&decoded, new_width, new_height)
}

/// Lanczos3 downscale via fast_image_resize, preserving aspect ratio.
fn resize_lanczos(image: &DynamicImage, new_width: u32, new_height: u32) -> Result<DynamicImage> {
    use fast_image_resize::images::Image as FirImage;
    use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};

    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    let src = FirImage::from_vec_u8(width, height, rgb.into_raw(), PixelType::U8x3)
        .map_err(|e| DocpulpError::image_decode(format!("failed to create source image: {e:?}")))?;
    let mut dst = FirImage::new(new_width, new_height, PixelType::U8x3);

    let mut resizer = Resizer::new();
    resizer
        .resize(
            &src,
            &mut dst,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Lanczos3)),
        )
        .map_err(|e| DocpulpError::image_decode(format!("resize failed: {e:?}")))?;

    let buffer = image::ImageBuffer::<image::Rgb<u8>, Vec<u8>>::from_raw(new_width, new_height, dst.into_vec())
        .ok_or_else(|| DocpulpError::image_decode("failed to rebuild image buffer".to_string()))?;
    Ok(DynamicImage::ImageRgb8(buffer))
}

/// Detect AVX support; used as the acceleration hint at engine init.
fn detect_avx() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        std::arch::is_x86_feature_detected!("avx2") || std::arch::is_x86_feature_detected!("avx")
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        false
    }
}
