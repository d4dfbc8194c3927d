//! Anteroom Core - Image acquisition library
//!
//! This crate provides the pure image half of Anteroom: per-context
//! validation, crop/zoom/rotation geometry, decoding with EXIF orientation,
//! and the composite pipeline that turns a crop selection into an encoded
//! binary ready for staging.

pub mod compose;
pub mod context;
pub mod decode;
pub mod encode;
pub mod geometry;
pub mod transform;
pub mod validate;

pub use compose::{composite, ComposeError, ComposedImage, CompositeParams};
pub use context::{ContextError, ContextRegistry, ImageContext, ZoomRange};
pub use decode::{decode_image, probe_dimensions, DecodeError, DecodedImage};
pub use encode::{encode_image, EncodeError, EncodeFormat};
pub use geometry::{
    centered_crop, clamp_zoom, min_zoom_for, pixel_crop_from_percent, rotated_bounds,
};
pub use transform::{apply_flip, apply_pixel_crop, apply_rotation, resize_exact, ResampleFilter};
pub use validate::{validate, CandidateFile, ValidationFailure, ValidationResult};

/// Pixel dimensions of an image or drawing surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Dimensions {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width-over-height ratio, or 0.0 for a degenerate height
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        f64::from(self.width) / f64::from(self.height)
    }

    /// Check whether both axes are at least as large as `other`
    pub fn covers(&self, other: Dimensions) -> bool {
        self.width >= other.width && self.height >= other.height
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Crop rectangle in percent units (0-100) of its containing surface
///
/// Percent crops are what the interactive cropper manipulates: they stay
/// meaningful when the underlying surface changes size (for example when the
/// rotation angle changes the rotated bounding box).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PercentCrop {
    /// Left edge (0-100)
    pub x: f64,
    /// Top edge (0-100)
    pub y: f64,
    /// Width (0-100)
    pub width: f64,
    /// Height (0-100)
    pub height: f64,
}

impl PercentCrop {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The full surface
    pub fn full() -> Self {
        Self::new(0.0, 0.0, 100.0, 100.0)
    }

    /// Scale the rectangle about its own center
    ///
    /// A factor below 1.0 shrinks the selection (zooming in), above 1.0
    /// grows it. The result is not clamped; callers follow up with
    /// [`PercentCrop::clamped`].
    pub fn scaled_about_center(&self, factor: f64) -> Self {
        let cx = self.x + self.width / 2.0;
        let cy = self.y + self.height / 2.0;
        let width = self.width * factor;
        let height = self.height * factor;
        Self {
            x: cx - width / 2.0,
            y: cy - height / 2.0,
            width,
            height,
        }
    }

    /// Clamp the rectangle into the 0-100 box, preserving its size where
    /// possible (the size itself is capped at the full surface)
    pub fn clamped(&self) -> Self {
        let width = self.width.clamp(0.0, 100.0);
        let height = self.height.clamp(0.0, 100.0);
        Self {
            x: self.x.clamp(0.0, 100.0 - width),
            y: self.y.clamp(0.0, 100.0 - height),
            width,
            height,
        }
    }
}

/// Crop rectangle in integer pixel space
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PixelCrop {
    /// Left edge in pixels
    pub x: u32,
    /// Top edge in pixels
    pub y: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl PixelCrop {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A crop covering an entire surface of the given size
    pub fn full(dimensions: Dimensions) -> Self {
        Self::new(0, 0, dimensions.width, dimensions.height)
    }

    /// Check whether the crop selects no pixels
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

/// Mirroring applied before rotation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Flip {
    /// No mirroring
    #[default]
    None,
    /// Mirror across the vertical axis
    Horizontal,
    /// Mirror across the horizontal axis
    Vertical,
    /// Mirror across both axes (equivalent to a 180 degree rotation)
    Both,
}

impl Flip {
    pub fn is_none(&self) -> bool {
        matches!(self, Flip::None)
    }
}

/// The crop/zoom/rotation parameters that produced a derived binary
///
/// Recorded alongside every staged image so the application can report or
/// replay how the output was obtained from the original file.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Derivation {
    /// Selected region in rotated-surface pixel space
    pub crop: PixelCrop,
    /// Zoom factor the selection was made at
    pub zoom: f64,
    /// Rotation in degrees, counter-clockwise positive
    pub rotation_degrees: f64,
    /// Mirroring applied before rotation
    pub flip: Flip,
    /// Dimensions of the derived output
    pub output: Dimensions,
}

impl Derivation {
    /// The derivation of a file staged as-is, without recompositing
    pub fn identity(dimensions: Dimensions) -> Self {
        Self {
            crop: PixelCrop::full(dimensions),
            zoom: 1.0,
            rotation_degrees: 0.0,
            flip: Flip::None,
            output: dimensions,
        }
    }

    /// Check whether this derivation leaves the source untouched
    pub fn is_identity(&self) -> bool {
        self.crop == PixelCrop::full(self.output)
            && self.zoom == 1.0
            && self.rotation_degrees == 0.0
            && self.flip.is_none()
    }
}
