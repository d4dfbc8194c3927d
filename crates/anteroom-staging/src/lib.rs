//! Asynchronous staging and upload orchestration for image acquisition.
//!
//! This crate drives the interactive half of the pipeline on top of the
//! pure operations in `anteroom-core`: selecting and validating a file,
//! running the cropper, staging composited binaries in memory, and
//! committing a staged handle into durable storage through an
//! externally-issued signed upload URL.
//!
//! # Architecture
//!
//! - [`session`]: the per-slot state machine ([`UploadSession`]) that UI
//!   layers talk to
//! - [`store`]: in-memory staging area mapping opaque handles to binaries
//! - [`backend`]: the [`ImageBackend`] capability trait and the in-process
//!   [`SoftwareBackend`]
//! - [`commit`]: the grant-then-transfer upload step behind
//!   [`CommitTransfer`]
//! - [`grant`]: the [`GrantProvider`] seam to whatever service signs
//!   upload URLs
//! - [`transfer`]: HTTP byte transport for the signed PUT
//!
//! Nothing in this crate talks to storage credentials directly: uploads
//! only ever go through single-use URLs issued by a [`GrantProvider`].

pub mod backend;
pub mod commit;
pub mod grant;
pub mod handle;
pub mod session;
pub mod store;
pub mod transfer;

pub use backend::{ImageBackend, SoftwareBackend};
pub use commit::{CommitTransfer, UploadError, Uploader};
pub use grant::{GrantError, GrantProvider, GrantRequest, SignedUploadGrant};
pub use handle::{StagingHandle, HANDLE_PREFIX};
pub use session::{
    CropperView, SelectOutcome, SessionError, SessionObserver, SlotState, UploadSession,
};
pub use store::{StageRequest, StagedEntry, StagingStore};
pub use transfer::{ByteTransport, HttpTransport, TransferError};
