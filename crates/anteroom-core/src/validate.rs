//! Candidate file validation.
//!
//! The validator answers one question: may this file enter this context?
//! Checks run cheapest-first and short-circuit: byte size, then content
//! type, then a header-only dimension probe, then the context's dimension
//! rules. Pixel decoding beyond the header never happens for files that
//! already failed an earlier step.
//!
//! # Content-type resolution
//!
//! The declared MIME type of a picked file is advisory (it usually comes
//! from the file extension). The validator sniffs the magic bytes and lets
//! the sniffed type win, falling back to the declaration only for content
//! the sniffer does not recognize. A `.png` renamed to `.jpg` is therefore
//! judged, and later staged, as `image/png`.
//!
//! # Direct-upload contexts
//!
//! A context with a fixed aspect ratio and no cropper controls cannot
//! resample anything, so candidates must match the required dimensions
//! exactly; everything else gets the ordinary at-least-minimum rule.

use thiserror::Error;

use crate::context::ImageContext;
use crate::decode::{self, DecodeError};
use crate::Dimensions;

/// A file picked or dropped by the user, before any processing
#[derive(Debug, Clone)]
pub struct CandidateFile {
    /// Original file name, as reported by the picker
    pub name: String,
    /// Declared MIME type, if the picker supplied one
    pub content_type: Option<String>,
    /// Raw file bytes
    pub bytes: Vec<u8>,
}

impl CandidateFile {
    pub fn new(name: impl Into<String>, content_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type,
            bytes,
        }
    }

    pub fn byte_size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Reasons a candidate file is rejected.
///
/// Every variant is recoverable by user action (pick a different file);
/// none of them aborts the surrounding form.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationFailure {
    /// The file exceeds the context's size ceiling
    #[error("file is {actual} bytes, exceeding the {limit} byte limit")]
    FileTooLarge { actual: u64, limit: u64 },

    /// The effective content type is not in the accepted list
    #[error("file content type is not accepted: {}", .found.as_deref().unwrap_or("unknown"))]
    UnsupportedType { found: Option<String> },

    /// The bytes could not be decoded as an image
    #[error("file could not be decoded: {0}")]
    Decode(#[from] DecodeError),

    /// The image is smaller than the context minimum
    #[error("image is {actual}, below the required minimum {required}")]
    TooSmall {
        actual: Dimensions,
        required: Dimensions,
    },

    /// A direct-upload context requires exact dimensions
    #[error("image is {actual}, but exactly {required} is required")]
    SizeMismatch {
        actual: Dimensions,
        required: Dimensions,
    },
}

/// Outcome of validating one candidate against one context
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    /// The first failed check, or `None` for an acceptable file
    pub failure: Option<ValidationFailure>,
    /// Natural (orientation-corrected) dimensions, when measurable
    pub actual: Option<Dimensions>,
    /// The context's required minimum, echoed for messages
    pub required: Dimensions,
    /// The resolved content type the file would be staged as
    pub content_type: Option<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.failure.is_none()
    }
}

/// Validate a candidate file against a context.
///
/// Runs the full pipeline and never panics on hostile input; malformed
/// bytes surface as a [`ValidationFailure`] inside the result.
pub fn validate(file: &CandidateFile, context: &ImageContext) -> ValidationResult {
    let required = context.min_dimensions();
    let resolved = effective_content_type(file);

    if let Err(failure) = validate_headers(file, context) {
        return ValidationResult {
            failure: Some(failure),
            actual: None,
            required,
            content_type: resolved,
        };
    }

    let actual = match decode::probe_dimensions(&file.bytes) {
        Ok(dims) => dims,
        Err(e) => {
            return ValidationResult {
                failure: Some(ValidationFailure::Decode(e)),
                actual: None,
                required,
                content_type: resolved,
            }
        }
    };

    ValidationResult {
        failure: validate_dimensions(actual, context).err(),
        actual: Some(actual),
        required,
        content_type: resolved,
    }
}

/// Size and content-type checks, the steps before any pixel work.
///
/// Returns the resolved content type on success so callers can reuse it
/// (for staging the file as-is, for example).
///
/// # Errors
///
/// [`ValidationFailure::FileTooLarge`] or
/// [`ValidationFailure::UnsupportedType`].
pub fn validate_headers(
    file: &CandidateFile,
    context: &ImageContext,
) -> Result<String, ValidationFailure> {
    let size = file.byte_size();
    if size > context.max_file_size {
        return Err(ValidationFailure::FileTooLarge {
            actual: size,
            limit: context.max_file_size,
        });
    }

    match effective_content_type(file) {
        Some(resolved) if context.accepts_type(&resolved) => Ok(resolved),
        found => Err(ValidationFailure::UnsupportedType { found }),
    }
}

/// The context's dimension rules.
///
/// # Errors
///
/// [`ValidationFailure::TooSmall`] below the minimum on either axis, or
/// [`ValidationFailure::SizeMismatch`] when a direct-upload context is not
/// matched exactly.
pub fn validate_dimensions(
    actual: Dimensions,
    context: &ImageContext,
) -> Result<(), ValidationFailure> {
    let required = context.min_dimensions();
    if !actual.covers(required) {
        return Err(ValidationFailure::TooSmall { actual, required });
    }
    if context.requires_exact_match() && actual != required {
        return Err(ValidationFailure::SizeMismatch { actual, required });
    }
    Ok(())
}

/// Resolve the content type a file is judged and staged as.
///
/// Magic bytes win over the declaration; the declaration is the fallback
/// for content the sniffer does not recognize.
pub fn effective_content_type(file: &CandidateFile) -> Option<String> {
    infer::get(&file.bytes)
        .map(|kind| kind.mime_type().to_string())
        .or_else(|| file.content_type.clone())
}
