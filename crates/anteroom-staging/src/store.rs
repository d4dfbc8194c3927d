//! In-memory staging for composited binaries.
//!
//! Staging decouples "the user finished editing" from "the bytes are
//! durable". A composited binary is parked here under an opaque handle;
//! the enclosing form later exchanges the handle for a durable storage key
//! by committing, or drops it by discarding. Until commit, nothing has
//! left the process.
//!
//! # Concurrency
//!
//! The handle map sits behind a plain mutex that is never held across an
//! await. Commit serializes per entry through an async gate plus a
//! write-once key cell, which is what makes replayed and overlapping
//! commits collapse into a single transfer. Discard during a running
//! commit is allowed: the committer keeps its own reference to the entry,
//! finishes the transfer, and returns the key of a binary the store no
//! longer tracks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use tracing::debug;

use anteroom_core::Derivation;

use crate::commit::{CommitTransfer, UploadError};
use crate::handle::StagingHandle;

/// Everything a caller supplies when parking a binary.
#[derive(Debug, Clone)]
pub struct StageRequest {
    /// The encoded payload.
    pub binary: Bytes,
    /// File name the binary will be labeled with at commit time.
    pub file_name: String,
    /// MIME type of `binary`.
    pub content_type: String,
    /// How the payload was derived from the originally selected file.
    pub derivation: Derivation,
    /// The acquisition context the binary belongs to.
    pub context_id: String,
}

/// A staged binary and everything known about it.
///
/// Entries are immutable apart from the committed key, which is written at
/// most once and never cleared or replaced.
#[derive(Debug)]
pub struct StagedEntry {
    handle: StagingHandle,
    binary: Bytes,
    preview: String,
    file_name: String,
    content_type: String,
    derivation: Derivation,
    committed: OnceLock<String>,
    commit_gate: tokio::sync::Mutex<()>,
}

impl StagedEntry {
    pub fn handle(&self) -> &StagingHandle {
        &self.handle
    }

    pub fn bytes(&self) -> &Bytes {
        &self.binary
    }

    pub fn byte_size(&self) -> usize {
        self.binary.len()
    }

    /// `data:` URL of the payload, for immediate preview display.
    pub fn preview_data_url(&self) -> &str {
        &self.preview
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn derivation(&self) -> &Derivation {
        &self.derivation
    }

    /// The durable key this entry was committed under, once it has been.
    pub fn committed_key(&self) -> Option<&str> {
        self.committed.get().map(String::as_str)
    }
}

/// Process-wide staging area, explicitly constructed and injectable.
///
/// Each test or application scope builds its own store; there is no
/// module-level singleton.
#[derive(Debug, Default)]
pub struct StagingStore {
    entries: Mutex<HashMap<StagingHandle, Arc<StagedEntry>>>,
}

impl StagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<StagingHandle, Arc<StagedEntry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Park a binary and mint a handle for it.
    pub fn stage(&self, request: StageRequest) -> Arc<StagedEntry> {
        let preview = format!(
            "data:{};base64,{}",
            request.content_type,
            BASE64.encode(&request.binary)
        );

        let mut entries = self.lock();
        let mut handle = StagingHandle::generate(&request.context_id);
        while entries.contains_key(&handle) {
            handle = StagingHandle::generate(&request.context_id);
        }

        let entry = Arc::new(StagedEntry {
            handle: handle.clone(),
            binary: request.binary,
            preview,
            file_name: request.file_name,
            content_type: request.content_type,
            derivation: request.derivation,
            committed: OnceLock::new(),
            commit_gate: tokio::sync::Mutex::new(()),
        });
        entries.insert(handle, Arc::clone(&entry));

        debug!(
            handle = %entry.handle(),
            bytes = entry.byte_size(),
            "staged binary"
        );
        entry
    }

    /// Look up a staged entry.
    pub fn get(&self, handle: &StagingHandle) -> Option<Arc<StagedEntry>> {
        self.lock().get(handle).map(Arc::clone)
    }

    /// Check whether a handle is currently staged here.
    pub fn contains(&self, handle: &StagingHandle) -> bool {
        self.lock().contains_key(handle)
    }

    /// Exchange a staged handle for a durable storage key.
    ///
    /// The transfer runs at most once per entry no matter how many times
    /// commit is called or how the calls overlap: the first committer
    /// performs it, everyone else waits on the gate and gets the same key
    /// back. A failed transfer releases the gate with the entry unchanged,
    /// so a later call starts over.
    ///
    /// # Errors
    ///
    /// [`UploadError::UnknownHandle`] when nothing is staged under the
    /// handle, otherwise whatever the transfer reports.
    pub async fn commit(
        &self,
        handle: &StagingHandle,
        transfer: &dyn CommitTransfer,
    ) -> Result<String, UploadError> {
        let entry = self.get(handle).ok_or_else(|| UploadError::UnknownHandle {
            handle: handle.clone(),
        })?;

        // Serialize committers on this entry. The map lock is already
        // released, so other handles stage and discard freely meanwhile.
        let _gate = entry.commit_gate.lock().await;

        if let Some(key) = entry.committed.get() {
            debug!(handle = %handle, key = %key, "commit replay, reusing key");
            return Ok(key.clone());
        }

        let key = transfer.transfer(&entry).await?;

        // We hold the gate, so this is the only writer.
        let _ = entry.committed.set(key.clone());
        debug!(handle = %handle, key = %key, "committed staged binary");
        Ok(key)
    }

    /// Drop a staged entry.
    ///
    /// Discarding an unknown or already-discarded handle is a no-op;
    /// removal paths fire on best effort and must not turn into errors.
    pub fn discard(&self, handle: &StagingHandle) -> bool {
        let removed = self.lock().remove(handle).is_some();
        if removed {
            debug!(handle = %handle, "discarded staged binary");
        } else {
            debug!(handle = %handle, "discard of unknown handle ignored");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
