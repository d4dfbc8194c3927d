//! Opaque handles for staged binaries.
//!
//! A handle is the only thing callers hold between staging and commit. Its
//! string form is deliberately distinguishable from a durable storage key,
//! so persistence layers can refuse to save a reference that was never
//! committed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix that marks a string as a staging handle rather than a storage key.
pub const HANDLE_PREFIX: &str = "staged://";

/// Opaque reference to a binary parked in a staging store.
///
/// The format is `staged://<context-id>/<uuid>`. Only the store mints
/// handles; everyone else treats the contents as opaque apart from the
/// prefix test.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StagingHandle(String);

impl StagingHandle {
    /// Mint a fresh handle for the given context.
    pub(crate) fn generate(context_id: &str) -> Self {
        Self(format!("{HANDLE_PREFIX}{context_id}/{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The acquisition context this handle was staged under.
    pub fn context_id(&self) -> &str {
        let rest = self.0.strip_prefix(HANDLE_PREFIX).unwrap_or(&self.0);
        match rest.rfind('/') {
            Some(idx) => &rest[..idx],
            None => rest,
        }
    }

    /// Check whether a string refers to staged (not yet durable) content.
    ///
    /// Form fields can hold either a staging handle or an already-committed
    /// storage key; this is how save paths tell the two apart.
    pub fn is_handle(value: &str) -> bool {
        value.starts_with(HANDLE_PREFIX)
    }

    /// Re-interpret an externally held string as a handle.
    ///
    /// Returns `None` for strings without the staging prefix, such as
    /// durable storage keys.
    pub fn parse(value: &str) -> Option<Self> {
        if Self::is_handle(value) {
            Some(Self(value.to_string()))
        } else {
            None
        }
    }
}

impl std::fmt::Display for StagingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
