//! Image encoding for staged output.
//!
//! Composited images are encoded once, at stage time, in the format the
//! acquisition context asks for. The encoded bytes are what gets staged
//! and eventually transferred, so this is the last lossy step in the
//! pipeline.
//!
//! # Architecture
//!
//! [`encode_image`] validates the pixel buffer once and dispatches to the
//! per-format encoder. Both encoders run synchronously; callers that must
//! not block move the whole composite-and-encode step off their hot path.

mod jpeg;
mod png;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decode::DecodedImage;

/// Errors that can occur during encoding.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Pixel data length doesn't match expected dimensions
    #[error("Invalid pixel data: expected {expected} bytes (width * height * 3), got {actual}")]
    InvalidPixelData { expected: usize, actual: usize },

    /// Width or height is zero
    #[error("Invalid dimensions: width ({width}) and height ({height}) must be non-zero")]
    InvalidDimensions { width: u32, height: u32 },

    /// The underlying codec failed
    #[error("{format} encoding failed: {message}")]
    EncodingFailed { format: EncodeFormat, message: String },
}

/// Output format for staged images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodeFormat {
    /// Lossy JPEG, quality-controlled. The default for photographic contexts.
    #[default]
    Jpeg,
    /// Lossless PNG. Quality settings are ignored.
    Png,
}

impl EncodeFormat {
    /// The MIME type of the encoded bytes.
    pub fn content_type(&self) -> &'static str {
        match self {
            EncodeFormat::Jpeg => "image/jpeg",
            EncodeFormat::Png => "image/png",
        }
    }

    /// The file extension conventionally used for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            EncodeFormat::Jpeg => "jpg",
            EncodeFormat::Png => "png",
        }
    }
}

impl std::fmt::Display for EncodeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeFormat::Jpeg => write!(f, "JPEG"),
            EncodeFormat::Png => write!(f, "PNG"),
        }
    }
}

/// Encode an image to the requested format.
///
/// # Arguments
///
/// * `image` - Source image (RGB, 3 bytes per pixel)
/// * `format` - Output format
/// * `quality` - Quality for lossy formats (1-100, clamped); ignored for PNG
///
/// # Returns
///
/// Encoded bytes on success.
///
/// # Errors
///
/// Returns an error if the image has zero dimensions, if the pixel buffer
/// does not match the declared dimensions, or if the codec itself fails.
pub fn encode_image(
    image: &DecodedImage,
    format: EncodeFormat,
    quality: u8,
) -> Result<Vec<u8>, EncodeError> {
    // Validate dimensions
    if image.width == 0 || image.height == 0 {
        return Err(EncodeError::InvalidDimensions {
            width: image.width,
            height: image.height,
        });
    }

    // Validate pixel data length
    let expected_len = (image.width as usize) * (image.height as usize) * 3;
    if image.pixels.len() != expected_len {
        return Err(EncodeError::InvalidPixelData {
            expected: expected_len,
            actual: image.pixels.len(),
        });
    }

    match format {
        EncodeFormat::Jpeg => jpeg::encode_jpeg(image, quality),
        EncodeFormat::Png => png::encode_png(image),
    }
}
