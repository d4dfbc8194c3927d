//! Raster image decoding with EXIF orientation handling.

use std::io::Cursor;

use exif::{In, Reader, Tag};
use image::DynamicImage;
use image::ImageReader;

use super::{DecodeError, DecodedImage, Orientation};
use crate::Dimensions;

/// Decode image bytes into an upright RGB buffer.
///
/// The container format is sniffed from the bytes themselves (JPEG, PNG,
/// and WebP are enabled), so a mislabelled file still decodes. Any EXIF
/// orientation is applied before the pixels are returned.
///
/// # Errors
///
/// `DecodeError::InvalidFormat` when the bytes are not a recognized image
/// format, `DecodeError::CorruptedFile` when decoding fails partway.
pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    // Orientation comes from the EXIF block, read before the pixel decode.
    let orientation = extract_orientation(bytes);

    let img = format_reader(bytes)?
        .decode()
        .map_err(|e| DecodeError::CorruptedFile(e.to_string()))?;

    let upright = apply_orientation(img, orientation);
    Ok(DecodedImage::from_rgb_image(upright.into_rgb8()))
}

/// Read the natural dimensions of an image without a full decode.
///
/// Only the header is parsed, so this is cheap even for large files. The
/// returned dimensions have EXIF orientation applied: a portrait photo
/// stored sideways reports its upright size, matching what
/// [`decode_image`] would produce.
///
/// # Errors
///
/// `DecodeError::InvalidFormat` when the bytes are not a recognized image
/// format, `DecodeError::CorruptedFile` when the header cannot be parsed.
pub fn probe_dimensions(bytes: &[u8]) -> Result<Dimensions, DecodeError> {
    let orientation = extract_orientation(bytes);

    let (width, height) = format_reader(bytes)?
        .into_dimensions()
        .map_err(|e| DecodeError::CorruptedFile(e.to_string()))?;

    if orientation.swaps_dimensions() {
        Ok(Dimensions::new(height, width))
    } else {
        Ok(Dimensions::new(width, height))
    }
}

/// Build a reader with the container format sniffed from the bytes.
fn format_reader(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, DecodeError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DecodeError::CorruptedFile(e.to_string()))?;
    if reader.format().is_none() {
        return Err(DecodeError::InvalidFormat);
    }
    Ok(reader)
}

/// Read the EXIF orientation tag; `Normal` when there is no EXIF block or
/// no usable orientation field.
fn extract_orientation(bytes: &[u8]) -> Orientation {
    let mut cursor = Cursor::new(bytes);
    match Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => exif
            .get_field(Tag::Orientation, In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .map(Orientation::from_exif)
            .unwrap_or_default(),
        Err(_) => Orientation::Normal,
    }
}

/// Undo a recorded EXIF orientation so the pixels read upright.
fn apply_orientation(img: DynamicImage, orientation: Orientation) -> DynamicImage {
    match orientation {
        Orientation::Normal => img,
        Orientation::FlipHorizontal => img.fliph(),
        Orientation::Rotate180 => img.rotate180(),
        Orientation::FlipVertical => img.flipv(),
        Orientation::Transpose => img.rotate90().fliph(),
        Orientation::Rotate90CW => img.rotate90(),
        Orientation::Transverse => img.rotate270().fliph(),
        Orientation::Rotate270CW => img.rotate270(),
    }
}
