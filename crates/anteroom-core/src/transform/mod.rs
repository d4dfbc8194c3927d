//! Image transformation operations: flip, rotation, crop, and resampling.
//!
//! These are the pixel-level stages the composite pipeline is built from.
//! Each operation is non-destructive and returns a new image.
//!
//! # Transform Order
//!
//! The composite pipeline applies transforms in this order:
//! 1. Flip (mirroring)
//! 2. Rotation (onto an expanded surface)
//! 3. Crop (pixel rectangle on the rotated surface)
//! 4. Resample to the forced output size, when the context fixes one
//!
//! # Coordinate System
//!
//! - Rotation angles are in degrees, positive = counter-clockwise
//! - Crop rectangles are integer pixels on the surface being cropped
//! - Origin is top-left corner

mod crop;
mod flip;
mod resize;
mod rotation;

pub use crop::apply_pixel_crop;
pub use flip::apply_flip;
pub use resize::resize_exact;
pub use rotation::apply_rotation;

use serde::{Deserialize, Serialize};

/// Interpolation filter used by rotation and resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResampleFilter {
    /// Nearest neighbor; fastest, blocky output.
    Nearest,
    /// Bilinear; the default trade-off for interactive previews.
    #[default]
    Bilinear,
    /// Lanczos with a=3; sharpest results, noticeably slower.
    Lanczos3,
}

impl ResampleFilter {
    /// The `image` crate filter this maps onto.
    pub fn to_image_filter(self) -> image::imageops::FilterType {
        use image::imageops::FilterType;
        match self {
            ResampleFilter::Nearest => FilterType::Nearest,
            ResampleFilter::Bilinear => FilterType::Triangle,
            ResampleFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}
