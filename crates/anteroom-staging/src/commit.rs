//! The commit pipeline: exchange a staged handle for a durable key.
//!
//! Committing is two network round trips: ask the grant provider for a
//! signed upload URL, then PUT the staged bytes to it. The durable key
//! named by the grant is only returned to the caller after the transfer
//! succeeded, so a key in hand always refers to bytes that arrived.
//!
//! Nothing here retries. A signed URL can expire between attempts, so a
//! retry needs a fresh grant, and whether to fetch one is the caller's
//! call.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::grant::{GrantError, GrantProvider, GrantRequest};
use crate::handle::StagingHandle;
use crate::store::{StagedEntry, StagingStore};
use crate::transfer::{ByteTransport, TransferError};

/// Errors from committing a staged binary.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Nothing is staged under the handle
    #[error("no staged binary under handle {handle}")]
    UnknownHandle { handle: StagingHandle },

    /// The grant issuer refused or could not be reached
    #[error(transparent)]
    Grant(#[from] GrantError),

    /// The issued grant expired before the transfer could start
    #[error("signed upload grant expired before the transfer could start")]
    ExpiredGrant,

    /// The issued grant does not cover a payload this large
    #[error("grant covers at most {limit} bytes but the staged binary is {byte_size}")]
    GrantTooSmall { limit: u64, byte_size: u64 },

    /// Moving the bytes failed
    #[error(transparent)]
    Transport(#[from] TransferError),
}

/// One attempt at moving a staged entry to durable storage.
///
/// [`crate::store::StagingStore::commit`] guarantees the attempt runs at
/// most once per entry; implementations only define what an attempt is.
#[async_trait]
pub trait CommitTransfer: Send + Sync {
    /// Move the entry's bytes and return the durable key they live under.
    async fn transfer(&self, entry: &StagedEntry) -> Result<String, UploadError>;
}

/// The production transfer: a grant provider plus a byte transport.
pub struct Uploader<P, T> {
    provider: P,
    transport: T,
}

impl<P, T> Uploader<P, T>
where
    P: GrantProvider,
    T: ByteTransport,
{
    pub fn new(provider: P, transport: T) -> Self {
        Self {
            provider,
            transport,
        }
    }

    /// Commit a staged handle through this uploader.
    ///
    /// Shorthand for [`StagingStore::commit`] with `self` as the
    /// transfer; the store's idempotence guarantees apply.
    ///
    /// # Errors
    ///
    /// [`UploadError::UnknownHandle`] for a handle the store does not
    /// know, otherwise whatever the grant or transfer step reported.
    pub async fn commit(
        &self,
        store: &StagingStore,
        handle: &StagingHandle,
    ) -> Result<String, UploadError> {
        store.commit(handle, self).await
    }
}

#[async_trait]
impl<P, T> CommitTransfer for Uploader<P, T>
where
    P: GrantProvider,
    T: ByteTransport,
{
    async fn transfer(&self, entry: &StagedEntry) -> Result<String, UploadError> {
        let request = GrantRequest {
            file_name: entry.file_name().to_string(),
            content_type: entry.content_type().to_string(),
            byte_size: entry.byte_size() as u64,
        };

        let grant = self.provider.issue(&request).await?;
        debug!(
            handle = %entry.handle(),
            key = %grant.key,
            expires_in = grant.expires_in_seconds,
            "received signed upload grant"
        );

        // A grant that is already dead or too small will only fail at the
        // storage endpoint; check before moving any bytes.
        if grant.expires_in_seconds == 0 {
            warn!(handle = %entry.handle(), "grant arrived already expired");
            return Err(UploadError::ExpiredGrant);
        }
        if let Some(limit) = grant.max_file_size {
            if request.byte_size > limit {
                warn!(
                    handle = %entry.handle(),
                    limit,
                    byte_size = request.byte_size,
                    "grant does not cover staged payload size"
                );
                return Err(UploadError::GrantTooSmall {
                    limit,
                    byte_size: request.byte_size,
                });
            }
        }

        self.transport
            .put(&grant.upload_url, entry.content_type(), entry.bytes().clone())
            .await?;

        Ok(grant.key)
    }
}
