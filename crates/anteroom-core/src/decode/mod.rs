//! Image decoding pipeline for Anteroom.
//!
//! This module provides functionality for:
//! - Decoding candidate files (JPEG, PNG, WebP) to RGB pixels
//! - EXIF orientation correction
//! - Fast dimension probing without a full decode
//!
//! # Architecture
//!
//! Decoding is synchronous and allocation-bounded: input is a byte slice,
//! output is an owned RGB buffer. Asynchrony, size ceilings, and content-type
//! policy live with the callers (the validator checks size and type before
//! any decode runs).
//!
//! # Orientation
//!
//! Phone cameras routinely store pixels sideways and record the upright
//! orientation in EXIF. Both [`decode_image`] and [`probe_dimensions`]
//! report the corrected view, so dimension rules always judge the image the
//! user actually sees.

mod raster;
mod types;

pub use raster::{decode_image, probe_dimensions};
pub use types::{DecodeError, DecodedImage, Orientation};
