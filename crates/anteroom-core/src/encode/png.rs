//! PNG encoding.
//!
//! PNG is the lossless option, used by contexts whose source material is
//! line art or UI chrome where JPEG ringing would show. There is no
//! quality knob; the default compression level is used.

use image::codecs::png::PngEncoder;
use image::ExtendedColorType;
use image::ImageEncoder;
use std::io::Cursor;

use super::{EncodeError, EncodeFormat};
use crate::decode::DecodedImage;

/// Encode RGB pixel data to PNG bytes.
///
/// Dimensions and buffer length are validated by [`super::encode_image`]
/// before dispatch.
pub(super) fn encode_png(image: &DecodedImage) -> Result<Vec<u8>, EncodeError> {
    let mut buffer = Cursor::new(Vec::new());
    let encoder = PngEncoder::new(&mut buffer);

    encoder
        .write_image(&image.pixels, image.width, image.height, ExtendedColorType::Rgb8)
        .map_err(|e| EncodeError::EncodingFailed {
            format: EncodeFormat::Png,
            message: e.to_string(),
        })?;

    Ok(buffer.into_inner())
}
