//! Composite pipeline: from a decoded source to encoded output bytes.
//!
//! The compositor applies the user's edits in a fixed order and encodes the
//! result once:
//!
//! 1. Flip (mirror horizontally and/or vertically)
//! 2. Rotation (onto the expanded bounding-box surface)
//! 3. Crop (pixel rect over the rotated surface)
//! 4. Resample (only when the context forces an exact output size)
//! 5. Encode (JPEG or PNG per context)
//!
//! Crop coordinates are interpreted over the surface produced by steps 1-2,
//! which is the same surface an interactive cropper displays. The pipeline
//! is pure: it never mutates its inputs, so a failure partway through
//! leaves the caller's state exactly as it was.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::{ImageContext, DEFAULT_ENCODE_QUALITY};
use crate::decode::DecodedImage;
use crate::encode::{encode_image, EncodeError, EncodeFormat};
use crate::geometry::ANGLE_TOLERANCE;
use crate::transform::{apply_flip, apply_pixel_crop, apply_rotation, resize_exact, ResampleFilter};
use crate::{Dimensions, Flip, PixelCrop};

/// Errors that can occur while compositing.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// The source image has no pixels
    #[error("source image is empty")]
    EmptySource,

    /// The crop rectangle has zero area
    #[error("crop region has zero area")]
    EmptyCrop,

    /// The crop origin lies entirely outside the edit surface
    #[error("crop origin ({}, {}) lies outside the {} surface", .crop.x, .crop.y, .surface)]
    CropOutOfBounds { crop: PixelCrop, surface: Dimensions },

    /// Encoding the composited pixels failed
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Everything the compositor needs to turn a source into output bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeParams {
    /// Crop rectangle in pixels over the flipped-and-rotated surface.
    pub crop: PixelCrop,
    /// Rotation in degrees, applied about the image center.
    pub rotation_degrees: f64,
    /// Mirroring, applied before rotation.
    pub flip: Flip,
    /// Encode quality for lossy formats (1-100).
    pub quality: u8,
    /// When set, the cropped region is resampled to exactly this size.
    pub output_size: Option<Dimensions>,
    /// Output encoding.
    pub format: EncodeFormat,
    /// Interpolation used for rotation and resampling.
    pub filter: ResampleFilter,
}

impl CompositeParams {
    /// Parameters for a plain crop with no rotation or flip, encoded with
    /// default quality.
    pub fn new(crop: PixelCrop) -> Self {
        Self {
            crop,
            rotation_degrees: 0.0,
            flip: Flip::None,
            quality: DEFAULT_ENCODE_QUALITY,
            output_size: None,
            format: EncodeFormat::default(),
            filter: ResampleFilter::Lanczos3,
        }
    }

    /// Parameters seeded from an acquisition context: its encode settings
    /// and, for fixed-resolution contexts, its forced output size.
    pub fn for_context(context: &ImageContext, crop: PixelCrop) -> Self {
        Self {
            crop,
            rotation_degrees: 0.0,
            flip: Flip::None,
            quality: context.encode_quality,
            output_size: context.forced_output_size(),
            format: context.encode_format,
            filter: ResampleFilter::Lanczos3,
        }
    }

    /// Set the rotation angle in degrees.
    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.rotation_degrees = degrees;
        self
    }

    /// Set the mirroring mode.
    pub fn with_flip(mut self, flip: Flip) -> Self {
        self.flip = flip;
        self
    }

    /// Set the interpolation filter.
    pub fn with_filter(mut self, filter: ResampleFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// An encoded composite ready for staging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedImage {
    /// Encoded bytes in `format`.
    pub bytes: Vec<u8>,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// The encoding the bytes are in.
    pub format: EncodeFormat,
}

impl ComposedImage {
    /// MIME type of the encoded bytes.
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }

    /// Output dimensions.
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// Size of the encoded payload in bytes.
    pub fn byte_size(&self) -> usize {
        self.bytes.len()
    }
}

/// Run the full composite pipeline over a decoded source.
///
/// # Arguments
///
/// * `image` - Decoded source image
/// * `params` - Edit and encode parameters
///
/// # Returns
///
/// The encoded output with its final dimensions.
///
/// # Errors
///
/// Returns an error for an empty source, a zero-area crop, a crop whose
/// origin lies beyond the edit surface, or an encoder failure. On error
/// nothing has been staged or mutated; the source is untouched.
pub fn composite(
    image: &DecodedImage,
    params: &CompositeParams,
) -> Result<ComposedImage, ComposeError> {
    if image.is_empty() {
        return Err(ComposeError::EmptySource);
    }
    if params.crop.is_empty() {
        return Err(ComposeError::EmptyCrop);
    }

    let flipped = apply_flip(image, params.flip);

    let rotated = if params.rotation_degrees.abs() < ANGLE_TOLERANCE {
        flipped
    } else {
        apply_rotation(&flipped, params.rotation_degrees, params.filter)
    };

    // The crop was chosen over the surface the caller saw, which includes
    // any canvas expansion from rotation. Reject selections that start
    // beyond it; in-bounds overhang is clamped by the crop itself.
    let surface = rotated.dimensions();
    if params.crop.x >= surface.width || params.crop.y >= surface.height {
        return Err(ComposeError::CropOutOfBounds {
            crop: params.crop,
            surface,
        });
    }

    let cropped = apply_pixel_crop(&rotated, &params.crop);

    let output = match params.output_size {
        Some(target) => resize_exact(&cropped, target, params.filter),
        None => cropped,
    };

    let bytes = encode_image(&output, params.format, params.quality)?;

    Ok(ComposedImage {
        bytes,
        width: output.width,
        height: output.height,
        format: params.format,
    })
}


// ============================================================================
// Property-Based Tests
// ============================================================================
