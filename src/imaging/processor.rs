use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbImage};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ImageConfig;
use crate::models::FailureCause;

/// Width multiplier for each downscale step once quality is at its floor
const DOWNSCALE_FACTOR: f64 = 0.85;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("cannot decode image: {0}")]
    Decode(String),

    #[error("cannot encode image: {0}")]
    Encode(String),

    #[error("image worker failed: {0}")]
    Worker(String),
}

impl ImageError {
    pub fn cause(&self) -> FailureCause {
        match self {
            ImageError::Decode(_) => FailureCause::DecodeError,
            ImageError::Encode(_) | ImageError::Worker(_) => FailureCause::EncodeError,
        }
    }
}

pub type Result<T> = std::result::Result<T, ImageError>;

/// Normalized page image plus everything the pipeline records about it
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub bytes: Bytes,
    pub thumbnail: Bytes,
    /// Lowercase hex SHA-256 of `bytes`
    pub content_hash: String,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    /// The byte budget could not be met at the quality and width floors
    pub oversized: bool,
    pub source_format: Option<&'static str>,
    pub source_size: usize,
}

/// Decodes page images and re-encodes them as baseline JPEG within a byte budget
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    config: ImageConfig,
}

impl ImageProcessor {
    pub fn new(config: ImageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    /// Run [`process`](Self::process) on the blocking pool so decode/encode
    /// never stalls the async workers holding fetch slots.
    pub async fn process_blocking(&self, raw: Bytes) -> Result<ProcessedImage> {
        let processor = self.clone();
        tokio::task::spawn_blocking(move || processor.process(&raw))
            .await
            .map_err(|e| ImageError::Worker(e.to_string()))?
    }

    pub fn process(&self, raw: &[u8]) -> Result<ProcessedImage> {
        let source_format = image::guess_format(raw)
            .ok()
            .and_then(|format| format.extensions_str().first().copied());
        let decoded =
            image::load_from_memory(raw).map_err(|e| ImageError::Decode(e.to_string()))?;

        let mut pixels = flatten(decoded);
        let budget = self.config.max_image_bytes.as_usize();
        let mut quality = self.config.quality;

        let (encoded, oversized) = loop {
            let encoded = encode_jpeg(&pixels, quality)?;
            if encoded.len() <= budget {
                break (encoded, false);
            }
            if quality > self.config.min_quality {
                quality = quality
                    .saturating_sub(self.config.quality_step)
                    .max(self.config.min_quality);
                continue;
            }
            let next_width = (pixels.width() as f64 * DOWNSCALE_FACTOR).floor() as u32;
            if next_width < self.config.min_width.max(1) {
                warn!(
                    size = encoded.len(),
                    budget,
                    width = pixels.width(),
                    quality,
                    "Image oversized at quality and width floor"
                );
                break (encoded, true);
            }
            pixels = resize_to_width(&pixels, next_width);
        };

        let thumbnail = self.thumbnail(&pixels)?;
        let content_hash = format!("{:x}", Sha256::digest(&encoded));

        debug!(
            source_size = raw.len(),
            size = encoded.len(),
            width = pixels.width(),
            height = pixels.height(),
            quality,
            "Normalized image"
        );

        Ok(ProcessedImage {
            bytes: Bytes::from(encoded),
            thumbnail: Bytes::from(thumbnail),
            content_hash,
            width: pixels.width(),
            height: pixels.height(),
            quality,
            oversized,
            source_format,
            source_size: raw.len(),
        })
    }

    fn thumbnail(&self, pixels: &RgbImage) -> Result<Vec<u8>> {
        if pixels.width() <= self.config.thumbnail_max_width {
            return encode_jpeg(pixels, self.config.thumbnail_quality);
        }
        let small = resize_to_width(pixels, self.config.thumbnail_max_width);
        encode_jpeg(&small, self.config.thumbnail_quality)
    }
}

/// Composite any alpha channel onto white and drop it
fn flatten(image: DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.into_rgb8();
    }
    let rgba = image.into_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |c: u8| ((c as u16 * a as u16 + 255 * (255 - a as u16)) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

fn resize_to_width(pixels: &RgbImage, width: u32) -> RgbImage {
    let height = ((pixels.height() as u64 * width as u64) / pixels.width().max(1) as u64).max(1);
    imageops::resize(pixels, width, height as u32, FilterType::Lanczos3)
}

fn encode_jpeg(pixels: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .write_image(
            pixels.as_raw(),
            pixels.width(),
            pixels.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(buf)
}
