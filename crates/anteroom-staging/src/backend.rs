//! Image capabilities behind an async seam.
//!
//! The interactive session needs exactly two image operations: decode a
//! candidate file and run the composite pipeline. Both sit behind a trait
//! so the state machine never touches pixels directly; a deployment can
//! swap in a GPU surface, a worker pool, or a remote service without
//! changing any session logic.

use async_trait::async_trait;

use anteroom_core::compose::{composite, ComposeError, ComposedImage, CompositeParams};
use anteroom_core::decode::{decode_image, DecodeError, DecodedImage};
use anteroom_core::validate::CandidateFile;

/// The image operations the session delegates.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Decode a candidate file into pixels, applying EXIF orientation.
    async fn decode(&self, file: &CandidateFile) -> Result<DecodedImage, DecodeError>;

    /// Run the composite pipeline over a decoded source.
    async fn composite(
        &self,
        image: &DecodedImage,
        params: &CompositeParams,
    ) -> Result<ComposedImage, ComposeError>;
}

/// Backend that runs the pure pipeline on the calling task.
///
/// Decoding and compositing are CPU-bound; this backend performs them
/// inline, which is fine for tests and small images. Deployments serving
/// an interactive UI wrap these calls in their runtime's blocking-section
/// mechanism instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareBackend;

#[async_trait]
impl ImageBackend for SoftwareBackend {
    async fn decode(&self, file: &CandidateFile) -> Result<DecodedImage, DecodeError> {
        decode_image(&file.bytes)
    }

    async fn composite(
        &self,
        image: &DecodedImage,
        params: &CompositeParams,
    ) -> Result<ComposedImage, ComposeError> {
        composite(image, params)
    }
}
