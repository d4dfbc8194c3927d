//! JPEG encoding.
//!
//! JPEG output uses the `image` crate's encoder with configurable quality.
//! Quality is set per acquisition context; 90 is the default and keeps
//! avatars and banners visually clean at reasonable byte sizes.

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use image::ImageEncoder;
use std::io::Cursor;

use super::{EncodeError, EncodeFormat};
use crate::decode::DecodedImage;

/// Encode RGB pixel data to JPEG bytes at the given quality (1-100,
/// out-of-range values are clamped).
///
/// Dimensions and buffer length are validated by [`super::encode_image`]
/// before dispatch.
pub(super) fn encode_jpeg(image: &DecodedImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let quality = quality.clamp(1, 100);

    let mut buffer = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .write_image(&image.pixels, image.width, image.height, ExtendedColorType::Rgb8)
        .map_err(|e| EncodeError::EncodingFailed {
            format: EncodeFormat::Jpeg,
            message: e.to_string(),
        })?;

    Ok(buffer.into_inner())
}
