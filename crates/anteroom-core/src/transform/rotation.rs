//! Image rotation onto an expanded surface.
//!
//! Rotation is inverse-mapped: every output pixel is traced back through
//! the inverse rotation to a source coordinate and sampled there. The
//! output surface is the rotated bounding box computed by
//! [`crate::geometry::rotated_bounds`], so no part of the source is ever
//! clipped; coordinates that land outside the source sample black.

use super::ResampleFilter;
use crate::decode::DecodedImage;
use crate::geometry::{self, ANGLE_TOLERANCE};

/// Rotate an image about its center.
///
/// The output surface is expanded to the rotated bounding box so the whole
/// source stays visible. Crop selections made over that surface are applied
/// afterwards by the composite pipeline.
///
/// # Arguments
///
/// * `image` - Source image to rotate
/// * `angle_degrees` - Rotation angle in degrees (positive = counter-clockwise)
/// * `filter` - Interpolation method (Bilinear for previews, Lanczos3 for output)
///
/// # Returns
///
/// New `DecodedImage` sized to the rotated bounding box.
pub fn apply_rotation(
    image: &DecodedImage,
    angle_degrees: f64,
    filter: ResampleFilter,
) -> DecodedImage {
    if angle_degrees.abs() < ANGLE_TOLERANCE {
        return image.clone();
    }

    let bounds = geometry::rotated_bounds(image.dimensions(), angle_degrees);

    // Inverse basis: rotating the output grid by -angle lands each output
    // pixel on the source point that should fill it. Negating here also
    // makes a positive angle read counter-clockwise on screen.
    let theta = -angle_degrees.to_radians();
    let (sin, cos) = theta.sin_cos();

    let src_center = (
        f64::from(image.width) / 2.0,
        f64::from(image.height) / 2.0,
    );
    let dst_center = (
        f64::from(bounds.width) / 2.0,
        f64::from(bounds.height) / 2.0,
    );

    // Widen before multiplying; the product can exceed u32 for very large
    // decoded surfaces.
    let row_stride = bounds.width as usize * 3;
    let mut pixels = vec![0u8; row_stride * bounds.height as usize];

    for (dst_y, row) in pixels.chunks_exact_mut(row_stride).enumerate() {
        let dy = dst_y as f64 - dst_center.1;
        for (dst_x, out) in row.chunks_exact_mut(3).enumerate() {
            let dx = dst_x as f64 - dst_center.0;

            let src_x = dx * cos - dy * sin + src_center.0;
            let src_y = dx * sin + dy * cos + src_center.1;

            out.copy_from_slice(&sample(image, src_x, src_y, filter));
        }
    }

    DecodedImage {
        width: bounds.width,
        height: bounds.height,
        pixels,
    }
}

fn sample(image: &DecodedImage, x: f64, y: f64, filter: ResampleFilter) -> [u8; 3] {
    match filter {
        ResampleFilter::Nearest => sample_nearest(image, x, y),
        ResampleFilter::Bilinear => sample_bilinear(image, x, y),
        ResampleFilter::Lanczos3 => sample_lanczos3(image, x, y),
    }
}

#[inline]
fn channels_at(image: &DecodedImage, px: usize, py: usize) -> [f64; 3] {
    let idx = (py * image.width as usize + px) * 3;
    let raw = &image.pixels[idx..idx + 3];
    [f64::from(raw[0]), f64::from(raw[1]), f64::from(raw[2])]
}

#[inline]
fn quantize(channels: [f64; 3]) -> [u8; 3] {
    [
        channels[0].clamp(0.0, 255.0).round() as u8,
        channels[1].clamp(0.0, 255.0).round() as u8,
        channels[2].clamp(0.0, 255.0).round() as u8,
    ]
}

/// Nearest-neighbor sample; black outside the source.
fn sample_nearest(image: &DecodedImage, x: f64, y: f64) -> [u8; 3] {
    let px = x.round();
    let py = y.round();
    if px < 0.0 || py < 0.0 || px >= f64::from(image.width) || py >= f64::from(image.height) {
        return [0, 0, 0];
    }
    quantize(channels_at(image, px as usize, py as usize))
}

/// Weighted blend of the 2x2 neighborhood around the sample point.
fn sample_bilinear(image: &DecodedImage, x: f64, y: f64) -> [u8; 3] {
    // The 2x2 neighborhood needs both floor and floor+1 in range.
    let max_x = f64::from(image.width) - 1.0;
    let max_y = f64::from(image.height) - 1.0;
    if x < 0.0 || y < 0.0 || x >= max_x || y >= max_y {
        return [0, 0, 0];
    }

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let rows = [
        (channels_at(image, x0, y0), channels_at(image, x0 + 1, y0)),
        (
            channels_at(image, x0, y0 + 1),
            channels_at(image, x0 + 1, y0 + 1),
        ),
    ];

    let mut blended = [0.0f64; 3];
    for c in 0..3 {
        let top = rows[0].0[c] * (1.0 - fx) + rows[0].1[c] * fx;
        let bottom = rows[1].0[c] * (1.0 - fx) + rows[1].1[c] * fx;
        blended[c] = top * (1.0 - fy) + bottom * fy;
    }
    quantize(blended)
}

/// Lanczos3 kernel radius.
const LANCZOS_A: f64 = 3.0;

/// Normalized blend over the 6x6 Lanczos3 neighborhood.
///
/// Near the image edge the full kernel does not fit; those samples fall
/// back to bilinear rather than renormalizing a truncated kernel.
fn sample_lanczos3(image: &DecodedImage, x: f64, y: f64) -> [u8; 3] {
    let w = image.width as i64;
    let h = image.height as i64;
    if x < 2.0 || y < 2.0 || x >= (w - 3) as f64 || y >= (h - 3) as f64 {
        return sample_bilinear(image, x, y);
    }

    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;

    let mut acc = [0.0f64; 3];
    let mut total_weight = 0.0;
    for ky in -2i64..=3 {
        let py = y0 + ky;
        if py < 0 || py >= h {
            continue;
        }
        let wy = lanczos_weight(y - py as f64);
        for kx in -2i64..=3 {
            let px = x0 + kx;
            if px < 0 || px >= w {
                continue;
            }
            let weight = lanczos_weight(x - px as f64) * wy;
            let contrib = channels_at(image, px as usize, py as usize);
            acc[0] += contrib[0] * weight;
            acc[1] += contrib[1] * weight;
            acc[2] += contrib[2] * weight;
            total_weight += weight;
        }
    }

    if total_weight <= 0.0 {
        return [0, 0, 0];
    }
    quantize([
        acc[0] / total_weight,
        acc[1] / total_weight,
        acc[2] / total_weight,
    ])
}

/// The Lanczos3 kernel: `sinc(x) * sinc(x / a)` inside the radius, zero
/// outside.
fn lanczos_weight(x: f64) -> f64 {
    let ax = x.abs();
    if ax < f64::EPSILON {
        return 1.0;
    }
    if ax >= LANCZOS_A {
        return 0.0;
    }
    let pi_x = std::f64::consts::PI * x;
    let pi_x_a = pi_x / LANCZOS_A;
    (LANCZOS_A * pi_x.sin() * pi_x_a.sin()) / (pi_x * pi_x)
}
