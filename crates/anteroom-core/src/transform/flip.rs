//! Image mirroring.

use crate::decode::DecodedImage;
use crate::Flip;

/// Mirror an image across one or both axes.
///
/// Flipping runs before rotation in the composite pipeline, matching how
/// the cropper presents its controls: the user flips the photo, then
/// straightens it.
///
/// # Arguments
///
/// * `image` - Source image
/// * `flip` - Which axes to mirror across
///
/// # Returns
///
/// A new `DecodedImage` with the same dimensions. `Flip::None` and
/// degenerate inputs return a plain copy.
pub fn apply_flip(image: &DecodedImage, flip: Flip) -> DecodedImage {
    // Fast path: nothing to mirror
    if flip.is_none() || image.is_empty() {
        return image.clone();
    }

    let Some(rgb) = image.to_rgb_image() else {
        return image.clone();
    };

    let flipped = match flip {
        Flip::None => rgb,
        Flip::Horizontal => image::imageops::flip_horizontal(&rgb),
        Flip::Vertical => image::imageops::flip_vertical(&rgb),
        // Mirroring both axes is a 180 degree rotation
        Flip::Both => image::imageops::rotate180(&rgb),
    };

    DecodedImage::from_rgb_image(flipped)
}
