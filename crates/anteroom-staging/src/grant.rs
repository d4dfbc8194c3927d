//! Signed upload grants.
//!
//! The commit path never mints storage credentials itself. A grant
//! provider, in production an authenticated application endpoint, issues a
//! short-lived pre-signed URL together with the durable key the binary
//! will become addressable under once the transfer succeeds.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the committer tells the issuer about the binary it wants to move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantRequest {
    /// File name the binary will be labeled with.
    pub file_name: String,
    /// MIME type of the staged bytes.
    pub content_type: String,
    /// Payload size, so the issuer can bound the signature.
    pub byte_size: u64,
}

/// A short-lived permission to PUT exactly one binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUploadGrant {
    /// Pre-signed destination for a single HTTP PUT.
    pub upload_url: String,
    /// Durable storage key the binary will live under.
    pub key: String,
    /// Seconds until the signed URL stops being honored.
    pub expires_in_seconds: u64,
    /// Largest payload the signature covers, when the issuer bounds it.
    pub max_file_size: Option<u64>,
}

/// Errors from the grant issuer.
#[derive(Debug, Error)]
pub enum GrantError {
    /// The issuer refused to sign for this binary
    #[error("grant request rejected: {0}")]
    Rejected(String),

    /// The issuer could not be reached at all
    #[error("grant endpoint unreachable: {0}")]
    Unreachable(String),
}

/// Issues signed upload grants.
///
/// Implementations call whatever backend owns the storage namespace. Tests
/// substitute a canned issuer.
#[async_trait]
pub trait GrantProvider: Send + Sync {
    async fn issue(&self, request: &GrantRequest) -> Result<SignedUploadGrant, GrantError>;
}
