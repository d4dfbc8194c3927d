//! Pixel-rect cropping.
//!
//! Crop rectangles arrive in pixel coordinates over whatever surface the
//! caller is working with: the native image, or the expanded surface
//! produced by rotation. The rectangle is clamped into the surface so a
//! slightly out-of-range selection degrades to the nearest valid crop
//! instead of failing.

use crate::decode::DecodedImage;
use crate::PixelCrop;

/// Extract a rectangular region from an image.
///
/// The crop rectangle is clamped to the image bounds. A rectangle that
/// degenerates to zero size after clamping yields a 1x1 image rather than
/// an empty one, so downstream consumers never see a zero-dimension buffer.
///
/// # Arguments
///
/// * `image` - Source image
/// * `crop` - Crop rectangle in pixel coordinates
///
/// # Returns
///
/// A new `DecodedImage` containing only the cropped region.
///
/// # Behavior
///
/// - Origins beyond the surface clamp to the last pixel row/column
/// - Extents beyond the surface clamp to what remains
/// - Minimum output dimension is 1x1 pixels
/// - A full-surface crop returns a copy of the original image
pub fn apply_pixel_crop(image: &DecodedImage, crop: &PixelCrop) -> DecodedImage {
    // Fast path: full-surface crop returns a clone
    if crop.x == 0 && crop.y == 0 && crop.width >= image.width && crop.height >= image.height {
        return image.clone();
    }

    if image.is_empty() {
        return image.clone();
    }

    // Clamp the origin inside the surface, then the extent to what remains
    let x = crop.x.min(image.width - 1);
    let y = crop.y.min(image.height - 1);
    let width = crop.width.clamp(1, image.width - x);
    let height = crop.height.clamp(1, image.height - y);

    // usize arithmetic throughout; u32 products can overflow for very
    // large decoded surfaces.
    let src_stride = image.width as usize * 3;
    let dst_stride = width as usize * 3;
    let mut output = vec![0u8; dst_stride * height as usize];

    // Copy row slices instead of individual pixels
    for row in 0..height as usize {
        let src_start = (y as usize + row) * src_stride + (x as usize * 3);
        let dst_start = row * dst_stride;
        output[dst_start..dst_start + dst_stride]
            .copy_from_slice(&image.pixels[src_start..src_start + dst_stride]);
    }

    DecodedImage {
        width,
        height,
        pixels: output,
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Strategy for generating image dimensions (keep reasonable for speed).
    fn dimensions_strategy() -> impl Strategy<Value = (u32, u32)> {
        (1u32..=64, 1u32..=64)
    }

    /// Strategy for generating crop rectangles, including out-of-range ones.
    fn crop_strategy() -> impl Strategy<Value = PixelCrop> {
        (0u32..=80, 0u32..=80, 0u32..=80, 0u32..=80).prop_map(|(x, y, width, height)| PixelCrop {
            x,
            y,
            width,
            height,
        })
    }

    fn solid_image(width: u32, height: u32) -> DecodedImage {
        DecodedImage {
            width,
            height,
            pixels: vec![127; (width * height * 3) as usize],
        }
    }

    proptest! {
        /// Property: Output never exceeds the source surface.
        #[test]
        fn prop_crop_within_source(
            (w, h) in dimensions_strategy(),
            crop in crop_strategy(),
        ) {
            let img = solid_image(w, h);
            let result = apply_pixel_crop(&img, &crop);

            prop_assert!(result.width <= w);
            prop_assert!(result.height <= h);
        }

        /// Property: Output is never empty for a non-empty source.
        #[test]
        fn prop_crop_never_empty(
            (w, h) in dimensions_strategy(),
            crop in crop_strategy(),
        ) {
            let img = solid_image(w, h);
            let result = apply_pixel_crop(&img, &crop);

            prop_assert!(result.width >= 1);
            prop_assert!(result.height >= 1);
            prop_assert_eq!(
                result.pixels.len(),
                (result.width * result.height * 3) as usize
            );
        }

        /// Property: An in-bounds crop keeps its requested size exactly.
        #[test]
        fn prop_in_bounds_crop_exact(
            (w, h) in dimensions_strategy(),
            fx in 0.0f64..1.0,
            fy in 0.0f64..1.0,
        ) {
            let x = (fx * (w - 1) as f64) as u32;
            let y = (fy * (h - 1) as f64) as u32;
            let crop = PixelCrop {
                x,
                y,
                width: w - x,
                height: h - y,
            };

            let img = solid_image(w, h);
            let result = apply_pixel_crop(&img, &crop);

            prop_assert_eq!(result.width, crop.width);
            prop_assert_eq!(result.height, crop.height);
        }

        /// Property: Cropping is deterministic.
        #[test]
        fn prop_crop_is_deterministic(
            (w, h) in dimensions_strategy(),
            crop in crop_strategy(),
        ) {
            let img = solid_image(w, h);

            let result1 = apply_pixel_crop(&img, &crop);
            let result2 = apply_pixel_crop(&img, &crop);

            prop_assert_eq!(result1.width, result2.width);
            prop_assert_eq!(result1.height, result2.height);
            prop_assert_eq!(result1.pixels, result2.pixels);
        }
    }
}
