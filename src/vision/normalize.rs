//! Photo normalization ahead of classification.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use crate::error::ClassifierError;

/// Fits photos into a square bounding box and re-encodes them as JPEG.
#[derive(Debug, Clone, Copy)]
pub struct ImageNormalizer {
    max_dimension: u32,
    quality: u8,
}

impl ImageNormalizer {
    pub fn new(max_dimension: u32, quality: u8) -> Self {
        Self {
            max_dimension,
            quality: quality.clamp(1, 100),
        }
    }

    /// Decode, resize (aspect preserved) and encode on the blocking pool.
    pub async fn normalize(&self, bytes: Vec<u8>) -> Result<Vec<u8>, ClassifierError> {
        let this = *self;
        tokio::task::spawn_blocking(move || this.normalize_blocking(&bytes))
            .await
            .map_err(|e| ClassifierError::Decode(format!("normalization task failed: {e}")))?
    }

    fn normalize_blocking(&self, bytes: &[u8]) -> Result<Vec<u8>, ClassifierError> {
        let decoded =
            image::load_from_memory(bytes).map_err(|e| ClassifierError::Decode(e.to_string()))?;
        let resized = decoded.resize(self.max_dimension, self.max_dimension, FilterType::Triangle);
        let (width, height) = resized.dimensions();
        tracing::debug!(width, height, "Normalized photo");

        // JPEG has no alpha channel.
        let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
        let mut out = Cursor::new(Vec::new());
        rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, self.quality))
            .map_err(|e| ClassifierError::Decode(e.to_string()))?;
        Ok(out.into_inner())
    }
}
