//! Crop and zoom geometry.
//!
//! Pure coordinate math shared by the validator, the compositor, and the
//! interactive cropper: rotated bounding boxes, the zoom floor for a given
//! target resolution, and conversions between percent-space crop selections
//! and pixel-space crop rectangles.
//!
//! # Coordinate Systems
//!
//! - Percent crops ([`PercentCrop`]) live in 0-100 units of their containing
//!   surface and survive surface resizes (rotation changes the surface).
//! - Pixel crops ([`PixelCrop`]) are integer rectangles on a concrete
//!   surface, produced here and consumed by the compositor.

use crate::{Dimensions, PercentCrop, PixelCrop};

/// Angles closer than this to an exact multiple of 90 degrees take the
/// lossless fast path.
pub(crate) const ANGLE_TOLERANCE: f64 = 0.001;

/// Compute the bounding box that contains an image after rotation.
///
/// When an image is rotated, the corners extend beyond the original bounds.
/// This function calculates the minimum bounding box that contains the
/// entire rotated image.
///
/// # Arguments
///
/// * `dimensions` - Original image dimensions
/// * `angle_degrees` - Rotation angle in degrees (positive = counter-clockwise)
///
/// # Returns
///
/// Dimensions of the rotated bounding box. Never zero on either axis.
pub fn rotated_bounds(dimensions: Dimensions, angle_degrees: f64) -> Dimensions {
    // Normalize angle to handle 360, 720, etc.
    let angle_normalized = angle_degrees % 360.0;

    // Fast path: no rotation needed (including near-zero and multiples of 360)
    if angle_normalized.abs() < ANGLE_TOLERANCE
        || (360.0 - angle_normalized.abs()).abs() < ANGLE_TOLERANCE
    {
        return dimensions;
    }

    // Fast path: exact 90/270 degree rotations (swap dimensions)
    let abs_angle = angle_normalized.abs();
    if (abs_angle - 90.0).abs() < ANGLE_TOLERANCE || (abs_angle - 270.0).abs() < ANGLE_TOLERANCE {
        return Dimensions::new(dimensions.height, dimensions.width);
    }

    // Fast path: exact 180 degree rotation (same dimensions)
    if (abs_angle - 180.0).abs() < ANGLE_TOLERANCE {
        return dimensions;
    }

    let angle_rad = angle_degrees.to_radians();
    let cos = angle_rad.cos().abs();
    let sin = angle_rad.sin().abs();

    let w = f64::from(dimensions.width);
    let h = f64::from(dimensions.height);

    // The bounding box of a rotated rectangle is:
    // new_w = |w*cos| + |h*sin|
    // new_h = |w*sin| + |h*cos|
    let new_w = (w * cos + h * sin).round() as u32;
    let new_h = (w * sin + h * cos).round() as u32;

    Dimensions::new(new_w.max(1), new_h.max(1))
}

/// Compute the zoom floor for cropping an image to a target resolution.
///
/// The floor is the smallest zoom at which the crop window can still cover a
/// source region of at least the target's size, so the derived output never
/// has to upscale at the default zoom. The per-axis coverage ratios are
/// `imageW / targetW` and `imageH / targetH`; the binding axis is the smaller
/// ratio, and the floor is capped at 1.0:
///
/// ```text
/// min_zoom = min(1.0, min(imageW / targetW, imageH / targetH))
/// ```
///
/// For an image that covers the target on both axes the floor is pinned at
/// 1.0. For a smaller image it drops below 1.0 so a valid selection stays
/// reachable. For square targets the expression reduces to
/// `min(imageW, imageH) / max(targetW, targetH)`, capped at 1.0.
///
/// # Arguments
///
/// * `image` - Natural dimensions of the loaded image
/// * `target` - Target resolution the crop must reach
///
/// # Returns
///
/// The zoom floor in `(0.0, 1.0]`. Degenerate inputs yield 1.0.
pub fn min_zoom_for(image: Dimensions, target: Dimensions) -> f64 {
    if image.width == 0 || image.height == 0 || target.width == 0 || target.height == 0 {
        return 1.0;
    }

    let horizontal = f64::from(image.width) / f64::from(target.width);
    let vertical = f64::from(image.height) / f64::from(target.height);

    horizontal.min(vertical).min(1.0)
}

/// Clamp a zoom value into a closed range.
///
/// An inverted range (min above max) collapses to its lower bound rather
/// than panicking, so a misconfigured context degrades to a fixed zoom.
pub fn clamp_zoom(zoom: f64, min: f64, max: f64) -> f64 {
    let max = max.max(min);
    zoom.clamp(min, max)
}

/// Convert a percent-space crop selection to a pixel rectangle on a surface.
///
/// Coordinates are scaled linearly, rounded to whole pixels, and clamped so
/// the rectangle lies entirely within the surface. A selection that rounds
/// to zero pixels stays zero; rejecting degenerate crops is the compositor's
/// decision, not a geometric one.
///
/// # Arguments
///
/// * `crop` - Selection in 0-100 units
/// * `surface` - The surface the percentages refer to (for rotated images,
///   the rotated bounding box)
pub fn pixel_crop_from_percent(crop: &PercentCrop, surface: Dimensions) -> PixelCrop {
    let sw = f64::from(surface.width);
    let sh = f64::from(surface.height);

    let x = (crop.x.clamp(0.0, 100.0) / 100.0 * sw).round() as u32;
    let y = (crop.y.clamp(0.0, 100.0) / 100.0 * sh).round() as u32;
    let width = (crop.width.clamp(0.0, 100.0) / 100.0 * sw).round() as u32;
    let height = (crop.height.clamp(0.0, 100.0) / 100.0 * sh).round() as u32;

    // Clamp into the surface
    let x = x.min(surface.width);
    let y = y.min(surface.height);
    let width = width.min(surface.width - x);
    let height = height.min(surface.height - y);

    PixelCrop::new(x, y, width, height)
}

/// The initial crop selection for a freshly loaded image.
///
/// Returns the largest centered selection with the given aspect ratio, or
/// the full surface for free-form cropping (no aspect, or a degenerate one).
///
/// # Arguments
///
/// * `surface` - Dimensions of the croppable surface
/// * `aspect` - Desired width-over-height ratio, or `None` for free-form
pub fn centered_crop(surface: Dimensions, aspect: Option<f64>) -> PercentCrop {
    let Some(aspect) = aspect else {
        return PercentCrop::full();
    };
    if !aspect.is_finite() || aspect <= 0.0 || surface.width == 0 || surface.height == 0 {
        return PercentCrop::full();
    }

    let sw = f64::from(surface.width);
    let sh = f64::from(surface.height);

    let width_px = sw.min(sh * aspect);
    // The back-division can round a hair past the surface edge; cap it so
    // the selection stays inside and the offsets stay non-negative.
    let height_px = (width_px / aspect).min(sh);

    PercentCrop {
        x: ((sw - width_px) / 2.0 / sw * 100.0).clamp(0.0, 100.0),
        y: ((sh - height_px) / 2.0 / sh * 100.0).clamp(0.0, 100.0),
        width: (width_px / sw * 100.0).clamp(0.0, 100.0),
        height: (height_px / sh * 100.0).clamp(0.0, 100.0),
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================
