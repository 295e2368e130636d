//! Grayscale to JPEG re-encoding for transport

use camera_capture::{Frame, PixelFormat};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use thiserror::Error;
use tracing::debug;

/// JPEG quality used when none is configured
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Encoder error types
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Encoder needs a grayscale frame, got {0:?}")]
    NotGrayscale(PixelFormat),

    #[error("JPEG encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

/// Compresses grayscale frames into standalone JPEG frames
#[derive(Debug, Clone, Copy)]
pub struct ImageEncoder {
    quality: u8,
}

impl Default for ImageEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl ImageEncoder {
    /// Create an encoder; quality is clamped to `1..=100`
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode into a newly allocated JPEG frame with the source dimensions.
    ///
    /// The source frame is only read; releasing it stays with its owner.
    pub fn encode(&self, frame: &Frame) -> Result<Frame, EncodeError> {
        if frame.format() != PixelFormat::Grayscale {
            return Err(EncodeError::NotGrayscale(frame.format()));
        }

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality).encode(
            frame.data(),
            frame.width(),
            frame.height(),
            ExtendedColorType::L8,
        )?;

        debug!(
            "Encoded {}x{} frame to {} byte JPEG (quality {})",
            frame.width(),
            frame.height(),
            jpeg.len(),
            self.quality
        );
        Ok(Frame::jpeg(jpeg, frame.width(), frame.height()))
    }
}
