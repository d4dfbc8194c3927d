//! Per-context acquisition constraints.
//!
//! An [`ImageContext`] is the externally supplied rule set for one kind of
//! image slot: minimum (or exact) dimensions, accepted content types, the
//! file-size ceiling, and which cropper controls are enabled. Contexts are
//! configuration, not business logic; the host application defines them and
//! hands them to the validator and the interactive session.
//!
//! A context with a fixed aspect ratio and both cropper controls disabled is
//! a direct-upload context: files must already have exactly the required
//! pixel dimensions because nothing is allowed to resample them.

use std::collections::HashMap;

use thiserror::Error;

use crate::encode::EncodeFormat;
use crate::Dimensions;

/// Default ceiling on candidate file size (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default encode quality for derived JPEG output.
pub const DEFAULT_ENCODE_QUALITY: u8 = 90;

/// Errors raised by context configuration and lookup.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ContextError {
    /// Minimum dimensions must be positive on both axes
    #[error("context {id}: minimum dimensions must be positive, got {dimensions}")]
    DegenerateMinimum { id: String, dimensions: Dimensions },

    /// Aspect ratio must be a positive finite number
    #[error("context {id}: aspect ratio must be positive and finite, got {aspect}")]
    InvalidAspectRatio { id: String, aspect: f64 },

    /// Zoom range must be positive and ordered
    #[error("context {id}: zoom range {min}..{max} is not a positive ordered range")]
    InvalidZoomRange { id: String, min: f64, max: f64 },

    /// At least one content type must be accepted
    #[error("context {id}: no accepted content types")]
    NoAcceptedTypes { id: String },

    /// Lookup for a context id that was never registered
    #[error("unknown context {0}")]
    Unknown(String),

    /// Registration under an id that is already taken
    #[error("context {0} is already registered")]
    Duplicate(String),
}

/// Inclusive zoom slider range offered by a context
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ZoomRange {
    /// Lower bound (further lowered per image by the zoom floor)
    pub min: f64,
    /// Upper bound
    pub max: f64,
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self { min: 1.0, max: 3.0 }
    }
}

/// Constraint set for one image slot kind
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ImageContext {
    /// Identifier the registry and staging handles are namespaced by
    pub id: String,
    /// Minimum acceptable width in pixels
    pub min_width: u32,
    /// Minimum acceptable height in pixels
    pub min_height: u32,
    /// Fixed output aspect ratio (width over height), or `None` for free-form
    pub aspect_ratio: Option<f64>,
    /// Ceiling on candidate file size in bytes
    pub max_file_size: u64,
    /// Quality passed to the encoder for derived output (1-100)
    pub encode_quality: u8,
    /// Encoding of derived output
    pub encode_format: EncodeFormat,
    /// Whether the cropper offers a rotation control
    pub allow_rotation: bool,
    /// Whether the cropper offers a zoom control
    pub allow_zoom: bool,
    /// Zoom slider range when zooming is allowed
    pub zoom_range: ZoomRange,
    /// Accepted MIME types (compared case-insensitively, parameters ignored)
    pub accepted_types: Vec<String>,
}

impl ImageContext {
    /// Create a context with the given minimum dimensions and defaults for
    /// everything else: free-form cropping with zoom and rotation enabled,
    /// JPEG output, and the standard web image types accepted.
    pub fn new(id: impl Into<String>, min_width: u32, min_height: u32) -> Self {
        Self {
            id: id.into(),
            min_width,
            min_height,
            aspect_ratio: None,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            encode_quality: DEFAULT_ENCODE_QUALITY,
            encode_format: EncodeFormat::Jpeg,
            allow_rotation: true,
            allow_zoom: true,
            zoom_range: ZoomRange::default(),
            accepted_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
            ],
        }
    }

    /// Check the configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant: degenerate minimum dimensions,
    /// a non-finite or non-positive aspect ratio, an unordered or
    /// non-positive zoom range, or an empty accepted-type list.
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.min_width == 0 || self.min_height == 0 {
            return Err(ContextError::DegenerateMinimum {
                id: self.id.clone(),
                dimensions: self.min_dimensions(),
            });
        }
        if let Some(aspect) = self.aspect_ratio {
            if !aspect.is_finite() || aspect <= 0.0 {
                return Err(ContextError::InvalidAspectRatio {
                    id: self.id.clone(),
                    aspect,
                });
            }
        }
        if !self.zoom_range.min.is_finite()
            || !self.zoom_range.max.is_finite()
            || self.zoom_range.min <= 0.0
            || self.zoom_range.min > self.zoom_range.max
        {
            return Err(ContextError::InvalidZoomRange {
                id: self.id.clone(),
                min: self.zoom_range.min,
                max: self.zoom_range.max,
            });
        }
        if self.accepted_types.is_empty() {
            return Err(ContextError::NoAcceptedTypes {
                id: self.id.clone(),
            });
        }
        Ok(())
    }

    pub fn min_dimensions(&self) -> Dimensions {
        Dimensions::new(self.min_width, self.min_height)
    }

    /// Whether any cropper control is available for this context
    pub fn cropping_enabled(&self) -> bool {
        self.allow_zoom || self.allow_rotation
    }

    /// Whether candidates must match the minimum dimensions exactly.
    ///
    /// True for direct-upload contexts: a fixed aspect ratio with every
    /// cropper control disabled means nothing may resample the pixels, so
    /// they have to be correct on arrival.
    pub fn requires_exact_match(&self) -> bool {
        self.aspect_ratio.is_some() && !self.cropping_enabled()
    }

    /// The exact output resolution derived images are resampled to, if the
    /// context fixes one (any context with a fixed aspect ratio does).
    pub fn forced_output_size(&self) -> Option<Dimensions> {
        self.aspect_ratio.map(|_| self.min_dimensions())
    }

    /// Check a MIME type against the accepted list.
    ///
    /// Parameters (`; charset=...`) are ignored and the comparison is
    /// case-insensitive.
    pub fn accepts_type(&self, content_type: &str) -> bool {
        let normalized = normalize_content_type(content_type);
        self.accepted_types
            .iter()
            .any(|accepted| normalize_content_type(accepted) == normalized)
    }
}

/// Strip MIME parameters and lowercase for comparison.
fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase()
}

/// Mapping from context id to its constraint set.
///
/// The host application registers its contexts once at startup; validation
/// happens at registration so a misconfigured context fails fast instead of
/// misjudging files later.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    contexts: HashMap<String, ImageContext>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a context under its id.
    ///
    /// # Errors
    ///
    /// Returns the context's own invariant violation, or
    /// [`ContextError::Duplicate`] if the id is already taken.
    pub fn register(&mut self, context: ImageContext) -> Result<(), ContextError> {
        context.validate()?;
        if self.contexts.contains_key(&context.id) {
            return Err(ContextError::Duplicate(context.id.clone()));
        }
        self.contexts.insert(context.id.clone(), context);
        Ok(())
    }

    /// Look up a context by id.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Unknown`] for an unregistered id.
    pub fn resolve(&self, id: &str) -> Result<&ImageContext, ContextError> {
        self.contexts
            .get(id)
            .ok_or_else(|| ContextError::Unknown(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
