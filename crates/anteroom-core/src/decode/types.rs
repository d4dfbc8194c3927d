//! Decoded-image buffer and EXIF orientation types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Dimensions;

/// Errors raised while turning candidate bytes into pixels.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The bytes are not a recognized image format.
    #[error("Invalid or unsupported image format")]
    InvalidFormat,

    /// The image file is corrupted or incomplete.
    #[error("Corrupted or incomplete image file: {0}")]
    CorruptedFile(String),
}

/// EXIF orientation tag values 1 through 8.
///
/// Cameras store these instead of rewriting pixels; the decoder applies the
/// recorded transform so everything downstream sees upright images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Orientation {
    /// Stored upright.
    #[default]
    Normal = 1,
    /// Mirrored across the vertical axis.
    FlipHorizontal = 2,
    /// Upside down.
    Rotate180 = 3,
    /// Mirrored across the horizontal axis.
    FlipVertical = 4,
    /// Mirrored, then a quarter turn counter-clockwise.
    Transpose = 5,
    /// A quarter turn clockwise.
    Rotate90CW = 6,
    /// Mirrored, then a quarter turn clockwise.
    Transverse = 7,
    /// A quarter turn counter-clockwise.
    Rotate270CW = 8,
}

impl Orientation {
    /// Interpret a raw EXIF orientation value; anything out of range reads
    /// as `Normal`.
    pub fn from_exif(value: u32) -> Self {
        match value {
            2 => Orientation::FlipHorizontal,
            3 => Orientation::Rotate180,
            4 => Orientation::FlipVertical,
            5 => Orientation::Transpose,
            6 => Orientation::Rotate90CW,
            7 => Orientation::Transverse,
            8 => Orientation::Rotate270CW,
            _ => Orientation::Normal,
        }
    }

    /// Whether applying this orientation exchanges width and height.
    #[inline]
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Orientation::Transpose
                | Orientation::Rotate90CW
                | Orientation::Transverse
                | Orientation::Rotate270CW
        )
    }
}

/// An owned RGB8 pixel buffer, row-major, 3 bytes per pixel.
///
/// This is the working representation for every stage between decode and
/// encode. The buffer length is always `width * height * 3`.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// RGB channel data.
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(
            pixels.len(),
            width as usize * height as usize * 3,
            "pixel buffer does not match dimensions"
        );
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Take ownership of an `image` crate RGB buffer.
    pub fn from_rgb_image(img: image::RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            pixels: img.into_raw(),
        }
    }

    /// Copy the buffer into an `image` crate RGB image for operations that
    /// go through `imageops`. `None` if the buffer length is wrong.
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.pixels.clone())
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    pub fn pixel_count(&self) -> u32 {
        self.width * self.height
    }

    /// Buffer size in bytes.
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }

    /// Whether the image carries no pixels at all.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.pixels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_from_exif() {
        assert_eq!(Orientation::from_exif(1), Orientation::Normal);
        assert_eq!(Orientation::from_exif(6), Orientation::Rotate90CW);
        assert_eq!(Orientation::from_exif(8), Orientation::Rotate270CW);
        // Out-of-range values read as upright
        assert_eq!(Orientation::from_exif(0), Orientation::Normal);
        assert_eq!(Orientation::from_exif(99), Orientation::Normal);
    }

    #[test]
    fn test_swapping_orientations() {
        let swapping = [
            Orientation::Transpose,
            Orientation::Rotate90CW,
            Orientation::Transverse,
            Orientation::Rotate270CW,
        ];
        for o in swapping {
            assert!(o.swaps_dimensions(), "{o:?}");
        }
        let upright = [
            Orientation::Normal,
            Orientation::FlipHorizontal,
            Orientation::Rotate180,
            Orientation::FlipVertical,
        ];
        for o in upright {
            assert!(!o.swaps_dimensions(), "{o:?}");
        }
    }

    #[test]
    fn test_decoded_image_accessors() {
        let img = DecodedImage::new(100, 50, vec![0u8; 100 * 50 * 3]);
        assert_eq!(img.dimensions(), Dimensions::new(100, 50));
        assert_eq!(img.pixel_count(), 5000);
        assert_eq!(img.byte_size(), 15000);
        assert!(!img.is_empty());
    }

    #[test]
    fn test_empty_image() {
        assert!(DecodedImage::new(0, 0, vec![]).is_empty());
    }

    #[test]
    fn test_rgb_image_round_trip() {
        let img = DecodedImage::new(2, 1, vec![1, 2, 3, 4, 5, 6]);
        let rgb = img.to_rgb_image().unwrap();
        let back = DecodedImage::from_rgb_image(rgb);
        assert_eq!(back.pixels, img.pixels);
        assert_eq!(back.dimensions(), img.dimensions());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            DecodeError::CorruptedFile("unexpected EOF".to_string()).to_string(),
            "Corrupted or incomplete image file: unexpected EOF"
        );
        assert_eq!(
            DecodeError::InvalidFormat.to_string(),
            "Invalid or unsupported image format"
        );
    }
}
