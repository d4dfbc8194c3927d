//! Resampling to an exact output size.
//!
//! Contexts that require a fixed output resolution take whatever region the
//! crop produced and resample it to that exact size. Aspect-ratio handling
//! happens upstream in the crop math, so this module never letterboxes or
//! preserves proportions on its own.

use crate::decode::DecodedImage;
use crate::Dimensions;

use super::ResampleFilter;

/// Resample an image to exactly the given dimensions.
///
/// The operation is total: zero target axes are raised to one pixel, an
/// empty source is returned unchanged, and a target equal to the source
/// dimensions is a clone.
///
/// # Arguments
///
/// * `image` - Source image
/// * `target` - Exact output dimensions
/// * `filter` - Interpolation method (Bilinear for previews, Lanczos3 for output)
///
/// # Returns
///
/// A new `DecodedImage` with exactly `target` dimensions.
pub fn resize_exact(image: &DecodedImage, target: Dimensions, filter: ResampleFilter) -> DecodedImage {
    // A 0x0 buffer is a valid RgbImage, so the conversion below would not
    // catch it and resampling would conjure target-sized black pixels.
    if image.is_empty() {
        return image.clone();
    }

    let width = target.width.max(1);
    let height = target.height.max(1);

    // Fast path: already at target size
    if image.width == width && image.height == height {
        return image.clone();
    }

    let Some(rgb) = image.to_rgb_image() else {
        return image.clone();
    };

    let resized = image::imageops::resize(&rgb, width, height, filter.to_image_filter());
    DecodedImage::from_rgb_image(resized)
}
