//! Interactive acquisition session for a single upload slot.
//!
//! One `UploadSession` owns one image field on a form: it validates the
//! selected file, drives the interactive cropper, stages the composited
//! result, and finally commits the staged handle at save time. The state
//! machine is framework-agnostic; a UI layer subscribes through
//! [`SessionObserver`] and renders whatever [`UploadSession::state`] and
//! [`UploadSession::cropper`] report.
//!
//! # States
//!
//! ```text
//! Empty -> Validating -> Invalid
//!                     -> Previewing          (cropping disabled: staged as-is)
//!                     -> Cropping -> Previewing -> Committing -> Committed
//!                                      ^   |
//!                                      +---+  (edit re-opens the cropper)
//! ```
//!
//! `Removed` is terminal and reachable from every state. Selecting a new
//! file restarts the cycle from any pre-commit state.
//!
//! # Concurrency
//!
//! All fields live behind one mutex that is never held across an await.
//! Decoding, compositing, and uploading run between two lock scopes; a
//! monotonically increasing selection token decides, on relock, whether
//! the finished work still belongs to the current selection or has been
//! superseded. Observer callbacks fire after the lock is released.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

use anteroom_core::compose::{ComposeError, CompositeParams};
use anteroom_core::context::ImageContext;
use anteroom_core::decode::DecodedImage;
use anteroom_core::encode::EncodeFormat;
use anteroom_core::geometry::{
    centered_crop, clamp_zoom, min_zoom_for, pixel_crop_from_percent, rotated_bounds,
};
use anteroom_core::validate::{
    validate, validate_dimensions, CandidateFile, ValidationFailure, ValidationResult,
};
use anteroom_core::{Derivation, Dimensions, Flip, PercentCrop};

use crate::backend::ImageBackend;
use crate::commit::{CommitTransfer, UploadError};
use crate::handle::StagingHandle;
use crate::store::{StageRequest, StagedEntry, StagingStore};

/// Where a slot is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// No file selected yet
    Empty,
    /// A selection is being validated and decoded
    Validating,
    /// The last selection was rejected
    Invalid,
    /// The cropper is open over a valid selection
    Cropping,
    /// A staged binary is ready to commit
    Previewing,
    /// The staged binary is being transferred
    Committing,
    /// The binary is durable under a storage key
    Committed,
    /// The slot was cleared; terminal
    Removed,
}

impl std::fmt::Display for SlotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SlotState::Empty => "empty",
            SlotState::Validating => "validating",
            SlotState::Invalid => "invalid",
            SlotState::Cropping => "cropping",
            SlotState::Previewing => "previewing",
            SlotState::Committing => "committing",
            SlotState::Committed => "committed",
            SlotState::Removed => "removed",
        };
        f.write_str(name)
    }
}

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation does not apply to the slot's current state
    #[error("operation not valid while the slot is {state}")]
    InvalidState { state: SlotState },

    /// A crop confirmation is already running
    #[error("a crop confirmation is already running")]
    Busy,

    /// The context locks rotation
    #[error("rotation is disabled for this context")]
    RotationDisabled,

    /// The context locks zoom
    #[error("zoom is disabled for this context")]
    ZoomDisabled,

    /// The context has no interactive cropper at all
    #[error("cropping is disabled for this context")]
    CroppingDisabled,

    /// A newer selection replaced this one mid-operation
    #[error("the selection was replaced before the operation finished")]
    Superseded,

    /// Compositing the confirmed crop failed
    #[error(transparent)]
    Compose(#[from] ComposeError),

    /// Committing the staged binary failed
    #[error(transparent)]
    Upload(#[from] UploadError),
}

/// Outcome of a file selection.
#[derive(Debug)]
pub enum SelectOutcome {
    /// The selection was processed; inspect the result for pass or fail.
    Applied(ValidationResult),
    /// A newer selection replaced this one while it was in flight. The
    /// session reflects the newer selection; this result was dropped.
    Superseded,
}

/// Callbacks for UI layers.
///
/// All methods have empty default bodies so observers implement only what
/// they render. Callbacks fire outside the session lock, in the order the
/// transitions happened.
pub trait SessionObserver: Send + Sync {
    /// The slot moved between states.
    fn state_changed(&self, _from: SlotState, _to: SlotState) {}

    /// A binary landed somewhere the form can reference: fired with the
    /// staging handle when a selection is staged, and again with the
    /// durable key once a commit finishes.
    fn upload_complete(&self, _reference: &str, _derivation: &Derivation) {}

    /// A commit attempt failed and the slot returned to `Previewing`.
    fn upload_error(&self, _reason: &str) {}
}

/// Snapshot of the interactive cropper for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct CropperView {
    /// Current selection over `surface`, in percent units.
    pub crop: PercentCrop,
    pub zoom: f64,
    /// Lower zoom bound for this image in this context.
    pub min_zoom: f64,
    /// Upper zoom bound from the context.
    pub max_zoom: f64,
    pub rotation_degrees: f64,
    pub flip: Flip,
    /// Native dimensions of the decoded source.
    pub source: Dimensions,
    /// Dimensions of the surface the crop is expressed over, including
    /// any canvas expansion from the current rotation.
    pub surface: Dimensions,
}

#[derive(Clone)]
struct CropperState {
    source: Arc<DecodedImage>,
    file: Arc<CandidateFile>,
    crop: PercentCrop,
    zoom: f64,
    min_zoom: f64,
    rotation_degrees: f64,
    flip: Flip,
}

struct SessionInner {
    state: SlotState,
    selection: u64,
    cropper: Option<CropperState>,
    staged: Option<Arc<StagedEntry>>,
    committed_key: Option<String>,
    last_failure: Option<ValidationFailure>,
    confirm_in_flight: bool,
}

/// Orchestrator for one image field.
pub struct UploadSession {
    context: ImageContext,
    store: Arc<StagingStore>,
    backend: Arc<dyn ImageBackend>,
    observer: Option<Arc<dyn SessionObserver>>,
    inner: Mutex<SessionInner>,
}

impl UploadSession {
    pub fn new(
        context: ImageContext,
        store: Arc<StagingStore>,
        backend: Arc<dyn ImageBackend>,
    ) -> Self {
        Self {
            context,
            store,
            backend,
            observer: None,
            inner: Mutex::new(SessionInner {
                state: SlotState::Empty,
                selection: 0,
                cropper: None,
                staged: None,
                committed_key: None,
                last_failure: None,
                confirm_in_flight: false,
            }),
        }
    }

    /// Attach an observer for state-change and upload callbacks.
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, from: SlotState, to: SlotState) {
        if from == to {
            return;
        }
        debug!(context = %self.context.id, %from, %to, "slot state changed");
        if let Some(observer) = &self.observer {
            observer.state_changed(from, to);
        }
    }

    pub fn context(&self) -> &ImageContext {
        &self.context
    }

    pub fn state(&self) -> SlotState {
        self.lock().state
    }

    /// The failure that put the slot into `Invalid`, if any.
    pub fn last_failure(&self) -> Option<ValidationFailure> {
        self.lock().last_failure.clone()
    }

    /// The staged entry backing `Previewing`/`Committing`, if any.
    pub fn staged(&self) -> Option<Arc<StagedEntry>> {
        self.lock().staged.clone()
    }

    /// The durable key of a completed commit, if one finished.
    pub fn committed_key(&self) -> Option<String> {
        self.lock().committed_key.clone()
    }

    /// Snapshot of the cropper, present from `Cropping` onward in
    /// contexts with interactive cropping.
    pub fn cropper(&self) -> Option<CropperView> {
        let inner = self.lock();
        inner.cropper.as_ref().map(|cropper| {
            let source = cropper.source.dimensions();
            CropperView {
                crop: cropper.crop,
                zoom: cropper.zoom,
                min_zoom: cropper.min_zoom,
                max_zoom: self.context.zoom_range.max,
                rotation_degrees: cropper.rotation_degrees,
                flip: cropper.flip,
                source,
                surface: rotated_bounds(source, cropper.rotation_degrees),
            }
        })
    }

    /// Select a file for this slot.
    ///
    /// Runs validation and decoding, then opens the cropper or, for
    /// contexts without one, stages the file as-is. Selecting again while
    /// a previous selection is still validating supersedes it: the slow
    /// result is dropped and only the newest selection is ever reflected.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidState`] once the slot is committing,
    /// committed, or removed. Validation failures are not errors; they
    /// arrive inside [`SelectOutcome::Applied`].
    pub async fn select_file(&self, file: CandidateFile) -> Result<SelectOutcome, SessionError> {
        let (token, from, old_staged) = {
            let mut inner = self.lock();
            if matches!(
                inner.state,
                SlotState::Committing | SlotState::Committed | SlotState::Removed
            ) {
                return Err(SessionError::InvalidState { state: inner.state });
            }
            inner.selection += 1;
            let old_staged = inner.staged.take();
            inner.cropper = None;
            inner.last_failure = None;
            let from = inner.state;
            inner.state = SlotState::Validating;
            (inner.selection, from, old_staged)
        };
        self.emit(from, SlotState::Validating);
        if let Some(entry) = old_staged {
            self.store.discard(entry.handle());
        }

        // Cheap synchronous checks first: size, type, header probe.
        let result = validate(&file, &self.context);
        if !result.is_valid() {
            return self.finish_invalid(token, result);
        }

        // Full decode through the backend; the probe only read headers.
        let decoded = match self.backend.decode(&file).await {
            Ok(decoded) => decoded,
            Err(e) => {
                let failed = ValidationResult {
                    failure: Some(ValidationFailure::Decode(e)),
                    actual: None,
                    required: self.context.min_dimensions(),
                    content_type: result.content_type,
                };
                return self.finish_invalid(token, failed);
            }
        };

        // Re-check against the decoded surface; orientation handling can
        // make it differ from the probed header dimensions.
        let native = decoded.dimensions();
        if let Err(failure) = validate_dimensions(native, &self.context) {
            let failed = ValidationResult {
                failure: Some(failure),
                actual: Some(native),
                required: self.context.min_dimensions(),
                content_type: result.content_type,
            };
            return self.finish_invalid(token, failed);
        }

        if !self.context.cropping_enabled() {
            return self.finish_direct(token, file, native, result);
        }

        // Seed the cropper: maximal centered selection at the context's
        // starting zoom.
        let target = self
            .context
            .forced_output_size()
            .unwrap_or_else(|| self.context.min_dimensions());
        let min_zoom = min_zoom_for(native, target);
        let zoom = clamp_zoom(self.context.zoom_range.min, min_zoom, self.context.zoom_range.max);
        let crop = centered_crop(native, self.context.aspect_ratio)
            .scaled_about_center(1.0 / zoom)
            .clamped();

        let cropper = CropperState {
            source: Arc::new(decoded),
            file: Arc::new(file),
            crop,
            zoom,
            min_zoom,
            rotation_degrees: 0.0,
            flip: Flip::None,
        };

        let from = {
            let mut inner = self.lock();
            if inner.selection != token || inner.state != SlotState::Validating {
                return Ok(SelectOutcome::Superseded);
            }
            inner.cropper = Some(cropper);
            let from = inner.state;
            inner.state = SlotState::Cropping;
            from
        };
        self.emit(from, SlotState::Cropping);
        Ok(SelectOutcome::Applied(result))
    }

    fn finish_invalid(
        &self,
        token: u64,
        result: ValidationResult,
    ) -> Result<SelectOutcome, SessionError> {
        let from = {
            let mut inner = self.lock();
            if inner.selection != token || inner.state != SlotState::Validating {
                return Ok(SelectOutcome::Superseded);
            }
            inner.last_failure = result.failure.clone();
            let from = inner.state;
            inner.state = SlotState::Invalid;
            from
        };
        self.emit(from, SlotState::Invalid);
        Ok(SelectOutcome::Applied(result))
    }

    /// Stage a validated file untouched; the path for contexts without a
    /// cropper.
    fn finish_direct(
        &self,
        token: u64,
        file: CandidateFile,
        native: Dimensions,
        result: ValidationResult,
    ) -> Result<SelectOutcome, SessionError> {
        let content_type = result
            .content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let request = StageRequest {
            binary: Bytes::from(file.bytes),
            file_name: file.name,
            content_type,
            derivation: Derivation::identity(native),
            context_id: self.context.id.clone(),
        };

        let (from, entry) = {
            let mut inner = self.lock();
            if inner.selection != token || inner.state != SlotState::Validating {
                return Ok(SelectOutcome::Superseded);
            }
            let entry = self.store.stage(request);
            inner.staged = Some(Arc::clone(&entry));
            let from = inner.state;
            inner.state = SlotState::Previewing;
            (from, entry)
        };
        self.emit(from, SlotState::Previewing);
        if let Some(observer) = &self.observer {
            observer.upload_complete(entry.handle().as_str(), entry.derivation());
        }
        Ok(SelectOutcome::Applied(result))
    }

    /// Replace the crop selection. Only valid while cropping.
    pub fn set_crop(&self, crop: PercentCrop) -> Result<(), SessionError> {
        self.with_cropper(|cropper, _| {
            cropper.crop = crop.clamped();
            Ok(())
        })
    }

    /// Change the zoom level, returning the effective (clamped) value.
    ///
    /// The selection is rescaled about its own center so the view the
    /// user has panned to stays put while the window grows or shrinks.
    pub fn set_zoom(&self, zoom: f64) -> Result<f64, SessionError> {
        if !self.context.allow_zoom {
            return Err(SessionError::ZoomDisabled);
        }
        self.with_cropper(|cropper, context| {
            let requested = if zoom.is_finite() { zoom } else { cropper.zoom };
            let clamped = clamp_zoom(requested, cropper.min_zoom, context.zoom_range.max);
            if clamped != cropper.zoom {
                let factor = cropper.zoom / clamped;
                cropper.crop = cropper.crop.scaled_about_center(factor).clamped();
                cropper.zoom = clamped;
            }
            Ok(clamped)
        })
    }

    /// Change the rotation angle.
    ///
    /// Rotation reshapes the edit surface, so the selection re-centers at
    /// the current zoom rather than trying to map the old pan across
    /// surfaces of different shapes.
    pub fn set_rotation(&self, degrees: f64) -> Result<(), SessionError> {
        if !self.context.allow_rotation {
            return Err(SessionError::RotationDisabled);
        }
        self.with_cropper(|cropper, context| {
            let degrees = if degrees.is_finite() { degrees % 360.0 } else { 0.0 };
            if degrees == cropper.rotation_degrees {
                return Ok(());
            }
            cropper.rotation_degrees = degrees;
            let surface = rotated_bounds(cropper.source.dimensions(), degrees);
            cropper.crop = centered_crop(surface, context.aspect_ratio)
                .scaled_about_center(1.0 / cropper.zoom)
                .clamped();
            Ok(())
        })
    }

    /// Change the mirroring mode. Shares the rotation toggle: contexts
    /// that lock orientation lock both.
    pub fn set_flip(&self, flip: Flip) -> Result<(), SessionError> {
        if !self.context.allow_rotation {
            return Err(SessionError::RotationDisabled);
        }
        self.with_cropper(|cropper, _| {
            cropper.flip = flip;
            Ok(())
        })
    }

    fn with_cropper<R>(
        &self,
        f: impl FnOnce(&mut CropperState, &ImageContext) -> Result<R, SessionError>,
    ) -> Result<R, SessionError> {
        let mut inner = self.lock();
        if inner.state != SlotState::Cropping {
            return Err(SessionError::InvalidState { state: inner.state });
        }
        let cropper = inner
            .cropper
            .as_mut()
            .ok_or(SessionError::InvalidState {
                state: SlotState::Cropping,
            })?;
        f(cropper, &self.context)
    }

    /// Composite the current selection and stage the result.
    ///
    /// On success the slot moves to `Previewing` with a fresh staged
    /// handle; any previously staged handle from an earlier confirm is
    /// discarded. The cropper state is retained so [`UploadSession::edit`]
    /// can re-open it.
    ///
    /// # Errors
    ///
    /// [`SessionError::Busy`] while another confirmation is running,
    /// [`SessionError::Compose`] if the pipeline fails (the slot stays in
    /// `Cropping`, untouched), [`SessionError::Superseded`] if the
    /// selection changed or the slot was removed mid-composite.
    pub async fn confirm_crop(&self) -> Result<StagingHandle, SessionError> {
        let (token, snapshot) = {
            let mut inner = self.lock();
            if inner.state != SlotState::Cropping {
                return Err(SessionError::InvalidState { state: inner.state });
            }
            if inner.confirm_in_flight {
                return Err(SessionError::Busy);
            }
            inner.confirm_in_flight = true;
            let snapshot = match inner.cropper.as_ref() {
                Some(cropper) => cropper.clone(),
                None => {
                    inner.confirm_in_flight = false;
                    return Err(SessionError::InvalidState {
                        state: SlotState::Cropping,
                    });
                }
            };
            (inner.selection, snapshot)
        };

        let surface = rotated_bounds(snapshot.source.dimensions(), snapshot.rotation_degrees);
        let pixel_crop = pixel_crop_from_percent(&snapshot.crop, surface);
        let params = CompositeParams::for_context(&self.context, pixel_crop)
            .with_rotation(snapshot.rotation_degrees)
            .with_flip(snapshot.flip);
        let format = params.format;

        let composed = match self.backend.composite(&snapshot.source, &params).await {
            Ok(composed) => composed,
            Err(e) => {
                let mut inner = self.lock();
                inner.confirm_in_flight = false;
                if inner.selection != token || inner.state != SlotState::Cropping {
                    return Err(SessionError::Superseded);
                }
                // The slot stays in Cropping with its selection intact.
                return Err(SessionError::Compose(e));
            }
        };

        let derivation = Derivation {
            crop: pixel_crop,
            zoom: snapshot.zoom,
            rotation_degrees: snapshot.rotation_degrees,
            flip: snapshot.flip,
            output: composed.dimensions(),
        };
        let request = StageRequest {
            file_name: derived_file_name(&snapshot.file.name, format),
            content_type: composed.content_type().to_string(),
            binary: Bytes::from(composed.bytes),
            derivation,
            context_id: self.context.id.clone(),
        };

        let (from, old_staged, entry) = {
            let mut inner = self.lock();
            inner.confirm_in_flight = false;
            if inner.selection != token || inner.state != SlotState::Cropping {
                return Err(SessionError::Superseded);
            }
            let entry = self.store.stage(request);
            let old_staged = inner.staged.replace(Arc::clone(&entry));
            let from = inner.state;
            inner.state = SlotState::Previewing;
            (from, old_staged, entry)
        };
        self.emit(from, SlotState::Previewing);
        if let Some(old) = old_staged {
            self.store.discard(old.handle());
        }
        if let Some(observer) = &self.observer {
            observer.upload_complete(entry.handle().as_str(), entry.derivation());
        }
        Ok(entry.handle().clone())
    }

    /// Re-open the cropper from `Previewing`.
    ///
    /// The staged handle from the previous confirm is discarded first so
    /// the store never accumulates orphans; the cropper resumes over the
    /// original decoded file, not the already-composited output.
    pub fn edit(&self) -> Result<(), SessionError> {
        if !self.context.cropping_enabled() {
            return Err(SessionError::CroppingDisabled);
        }
        let (from, old_staged) = {
            let mut inner = self.lock();
            if inner.state != SlotState::Previewing {
                return Err(SessionError::InvalidState { state: inner.state });
            }
            if inner.cropper.is_none() {
                return Err(SessionError::CroppingDisabled);
            }
            let old_staged = inner.staged.take();
            let from = inner.state;
            inner.state = SlotState::Cropping;
            (from, old_staged)
        };
        self.emit(from, SlotState::Cropping);
        if let Some(entry) = old_staged {
            self.store.discard(entry.handle());
        }
        Ok(())
    }

    /// Clear the slot. Terminal and idempotent; valid from every state.
    ///
    /// Any staged handle is discarded. A commit already in flight is not
    /// interrupted: it completes against its own reference and returns
    /// its key, but the slot stays removed.
    pub fn remove(&self) -> Result<(), SessionError> {
        let (from, old_staged) = {
            let mut inner = self.lock();
            if inner.state == SlotState::Removed {
                return Ok(());
            }
            let old_staged = inner.staged.take();
            inner.cropper = None;
            inner.last_failure = None;
            let from = inner.state;
            inner.state = SlotState::Removed;
            (from, old_staged)
        };
        self.emit(from, SlotState::Removed);
        if let Some(entry) = old_staged {
            self.store.discard(entry.handle());
        }
        Ok(())
    }

    /// Commit the staged binary, exchanging its handle for a durable key.
    ///
    /// Safe to call more than once, sequentially or overlapping: the
    /// store performs at most one transfer per staged entry and every
    /// call resolves to the same key, including calls made after the
    /// slot has already reached `Committed`. A failed attempt returns
    /// the slot to `Previewing` with the handle intact so the caller
    /// can retry.
    pub async fn commit(&self, transfer: &dyn CommitTransfer) -> Result<String, SessionError> {
        let (entry, event) = {
            let mut inner = self.lock();
            if inner.state == SlotState::Committed {
                if let Some(key) = inner.committed_key.clone() {
                    return Ok(key);
                }
                return Err(SessionError::InvalidState { state: inner.state });
            }
            if !matches!(inner.state, SlotState::Previewing | SlotState::Committing) {
                return Err(SessionError::InvalidState { state: inner.state });
            }
            let entry = match inner.staged.as_ref() {
                Some(entry) => Arc::clone(entry),
                None => return Err(SessionError::InvalidState { state: inner.state }),
            };
            let event = if inner.state == SlotState::Previewing {
                inner.state = SlotState::Committing;
                Some((SlotState::Previewing, SlotState::Committing))
            } else {
                None
            };
            (entry, event)
        };
        if let Some((from, to)) = event {
            self.emit(from, to);
        }

        match self.store.commit(entry.handle(), transfer).await {
            Ok(key) => {
                let completed = {
                    let mut inner = self.lock();
                    inner.committed_key = Some(key.clone());
                    if inner.state == SlotState::Committing {
                        inner.state = SlotState::Committed;
                        true
                    } else {
                        false
                    }
                };
                if completed {
                    self.emit(SlotState::Committing, SlotState::Committed);
                    if let Some(observer) = &self.observer {
                        observer.upload_complete(&key, entry.derivation());
                    }
                }
                Ok(key)
            }
            Err(e) => {
                let reverted = {
                    let mut inner = self.lock();
                    if inner.state == SlotState::Committing {
                        inner.state = SlotState::Previewing;
                        true
                    } else {
                        false
                    }
                };
                if reverted {
                    self.emit(SlotState::Committing, SlotState::Previewing);
                    warn!(context = %self.context.id, error = %e, "upload commit failed");
                    if let Some(observer) = &self.observer {
                        observer.upload_error(&e.to_string());
                    }
                }
                Err(SessionError::Upload(e))
            }
        }
    }
}

/// File name for a composited output: the original stem with the encode
/// format's extension.
fn derived_file_name(original: &str, format: EncodeFormat) -> String {
    let stem = match original.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => original,
    };
    format!("{stem}.{}", format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareBackend;
    use crate::transfer::TransferError;
    use anteroom_core::{encode_image, DecodeError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn png_file(name: &str, width: u32, height: u32) -> CandidateFile {
        let image = DecodedImage {
            width,
            height,
            pixels: vec![110u8; (width * height * 3) as usize],
        };
        let bytes = encode_image(&image, EncodeFormat::Png, 100).unwrap();
        CandidateFile::new(name, Some("image/png".to_string()), bytes)
    }

    /// Square-avatar context scaled down for fast tests: same shape as a
    /// 1080x1080 context but 54x54.
    fn avatar_context() -> ImageContext {
        let mut ctx = ImageContext::new("avatar", 54, 54);
        ctx.aspect_ratio = Some(1.0);
        ctx
    }

    /// Direct-upload banner: fixed aspect, no cropper.
    fn banner_context() -> ImageContext {
        let mut ctx = ImageContext::new("banner", 97, 25);
        ctx.aspect_ratio = Some(97.0 / 25.0);
        ctx.allow_rotation = false;
        ctx.allow_zoom = false;
        ctx
    }

    fn new_session(ctx: ImageContext) -> (Arc<UploadSession>, Arc<StagingStore>) {
        let store = Arc::new(StagingStore::new());
        let session = Arc::new(UploadSession::new(
            ctx,
            Arc::clone(&store),
            Arc::new(SoftwareBackend),
        ));
        (session, store)
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<(SlotState, SlotState)>>,
        completions: Mutex<Vec<(String, Dimensions)>>,
        errors: Mutex<Vec<String>>,
    }

    impl SessionObserver for RecordingObserver {
        fn state_changed(&self, from: SlotState, to: SlotState) {
            self.events.lock().unwrap().push((from, to));
        }

        fn upload_complete(&self, key: &str, derivation: &Derivation) {
            self.completions
                .lock()
                .unwrap()
                .push((key.to_string(), derivation.output));
        }

        fn upload_error(&self, reason: &str) {
            self.errors.lock().unwrap().push(reason.to_string());
        }
    }

    /// Backend whose first decode blocks until released.
    struct SlowFirstDecode {
        inner: SoftwareBackend,
        pending: AtomicBool,
        started: Notify,
        release: Notify,
    }

    impl SlowFirstDecode {
        fn new() -> Self {
            Self {
                inner: SoftwareBackend,
                pending: AtomicBool::new(true),
                started: Notify::new(),
                release: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl ImageBackend for SlowFirstDecode {
        async fn decode(&self, file: &CandidateFile) -> Result<DecodedImage, DecodeError> {
            if self.pending.swap(false, Ordering::SeqCst) {
                self.started.notify_one();
                self.release.notified().await;
            }
            self.inner.decode(file).await
        }

        async fn composite(
            &self,
            image: &DecodedImage,
            params: &CompositeParams,
        ) -> Result<anteroom_core::ComposedImage, ComposeError> {
            self.inner.composite(image, params).await
        }
    }

    /// Backend whose first composite blocks until released.
    struct SlowFirstComposite {
        inner: SoftwareBackend,
        pending: AtomicBool,
        started: Notify,
        release: Notify,
    }

    impl SlowFirstComposite {
        fn new() -> Self {
            Self {
                inner: SoftwareBackend,
                pending: AtomicBool::new(true),
                started: Notify::new(),
                release: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl ImageBackend for SlowFirstComposite {
        async fn decode(&self, file: &CandidateFile) -> Result<DecodedImage, DecodeError> {
            self.inner.decode(file).await
        }

        async fn composite(
            &self,
            image: &DecodedImage,
            params: &CompositeParams,
        ) -> Result<anteroom_core::ComposedImage, ComposeError> {
            if self.pending.swap(false, Ordering::SeqCst) {
                self.started.notify_one();
                self.release.notified().await;
            }
            self.inner.composite(image, params).await
        }
    }

    struct CountingTransfer {
        calls: AtomicUsize,
        key: String,
    }

    impl CountingTransfer {
        fn new(key: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                key: key.to_string(),
            }
        }
    }

    #[async_trait]
    impl CommitTransfer for CountingTransfer {
        async fn transfer(&self, _entry: &StagedEntry) -> Result<String, UploadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.key.clone())
        }
    }

    struct FailingTransfer;

    #[async_trait]
    impl CommitTransfer for FailingTransfer {
        async fn transfer(&self, _entry: &StagedEntry) -> Result<String, UploadError> {
            Err(UploadError::Transport(TransferError::Status { status: 500 }))
        }
    }

    struct BlockingTransfer {
        calls: AtomicUsize,
        started: Notify,
        release: Notify,
    }

    impl BlockingTransfer {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                started: Notify::new(),
                release: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl CommitTransfer for BlockingTransfer {
        async fn transfer(&self, _entry: &StagedEntry) -> Result<String, UploadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            self.release.notified().await;
            Ok("uploads/slow.jpg".to_string())
        }
    }

    fn assert_applied_valid(outcome: &SelectOutcome) {
        match outcome {
            SelectOutcome::Applied(result) => {
                assert!(result.is_valid(), "unexpected failure: {:?}", result.failure)
            }
            SelectOutcome::Superseded => panic!("selection unexpectedly superseded"),
        }
    }

    #[test]
    fn test_initial_state() {
        let (session, _store) = new_session(avatar_context());
        assert_eq!(session.state(), SlotState::Empty);
        assert!(session.cropper().is_none());
        assert!(session.staged().is_none());
        assert!(session.committed_key().is_none());
    }

    #[tokio::test]
    async fn test_invalid_selection() {
        let observer = Arc::new(RecordingObserver::default());
        let store = Arc::new(StagingStore::new());
        let session = UploadSession::new(avatar_context(), store, Arc::new(SoftwareBackend))
            .with_observer(observer.clone());

        let file = CandidateFile::new("junk.bin", None, vec![0u8; 16]);
        let outcome = session.select_file(file).await.unwrap();

        match outcome {
            SelectOutcome::Applied(result) => assert!(matches!(
                result.failure,
                Some(ValidationFailure::UnsupportedType { .. })
            )),
            SelectOutcome::Superseded => panic!("not superseded"),
        }
        assert_eq!(session.state(), SlotState::Invalid);
        assert!(session.last_failure().is_some());
        assert_eq!(
            *observer.events.lock().unwrap(),
            vec![
                (SlotState::Empty, SlotState::Validating),
                (SlotState::Validating, SlotState::Invalid),
            ]
        );
    }

    #[tokio::test]
    async fn test_valid_selection_opens_cropper() {
        let (session, _store) = new_session(avatar_context());

        let outcome = session.select_file(png_file("photo.png", 100, 75)).await.unwrap();
        assert_applied_valid(&outcome);
        assert_eq!(session.state(), SlotState::Cropping);

        let view = session.cropper().unwrap();
        assert_eq!(view.source, Dimensions::new(100, 75));
        assert_eq!(view.surface, Dimensions::new(100, 75));
        assert!((view.min_zoom - 1.0).abs() < 1e-9);
        assert!((view.zoom - 1.0).abs() < 1e-9);
        // Maximal centered square selection over a 4:3 source
        assert!((view.crop.x - 12.5).abs() < 1e-9);
        assert!((view.crop.y - 0.0).abs() < 1e-9);
        assert!((view.crop.width - 75.0).abs() < 1e-9);
        assert!((view.crop.height - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_reselect_replaces_invalid() {
        let (session, _store) = new_session(avatar_context());

        session
            .select_file(CandidateFile::new("junk.bin", None, vec![0u8; 4]))
            .await
            .unwrap();
        assert_eq!(session.state(), SlotState::Invalid);

        let outcome = session.select_file(png_file("photo.png", 100, 75)).await.unwrap();
        assert_applied_valid(&outcome);
        assert_eq!(session.state(), SlotState::Cropping);
        assert!(session.last_failure().is_none());
    }

    #[tokio::test]
    async fn test_direct_upload_stages_as_is() {
        let (session, store) = new_session(banner_context());
        let file = png_file("banner.png", 97, 25);
        let original_bytes = file.bytes.clone();

        let outcome = session.select_file(file).await.unwrap();
        assert_applied_valid(&outcome);
        assert_eq!(session.state(), SlotState::Previewing);
        assert!(session.cropper().is_none());

        let entry = session.staged().unwrap();
        assert!(entry.derivation().is_identity());
        assert_eq!(entry.derivation().output, Dimensions::new(97, 25));
        assert_eq!(entry.content_type(), "image/png");
        assert_eq!(entry.bytes().as_ref(), original_bytes.as_slice());
        assert_eq!(entry.file_name(), "banner.png");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_direct_upload_rejects_oversize() {
        let (session, store) = new_session(banner_context());

        let outcome = session.select_file(png_file("banner.png", 98, 25)).await.unwrap();
        match outcome {
            SelectOutcome::Applied(result) => assert!(matches!(
                result.failure,
                Some(ValidationFailure::SizeMismatch { .. })
            )),
            SelectOutcome::Superseded => panic!("not superseded"),
        }
        assert_eq!(session.state(), SlotState::Invalid);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_confirm_crop_stages_composite() {
        let (session, store) = new_session(avatar_context());
        session.select_file(png_file("photo.png", 100, 75)).await.unwrap();

        let handle = session.confirm_crop().await.unwrap();
        assert_eq!(session.state(), SlotState::Previewing);
        assert!(store.contains(&handle));

        let entry = session.staged().unwrap();
        assert_eq!(entry.handle(), &handle);
        assert_eq!(entry.derivation().output, Dimensions::new(54, 54));
        assert_eq!(entry.content_type(), "image/jpeg");
        assert_eq!(entry.file_name(), "photo.jpg");
        assert!(entry.preview_data_url().starts_with("data:image/jpeg;base64,"));
    }

    #[tokio::test]
    async fn test_confirm_requires_cropping_state() {
        let (session, _store) = new_session(avatar_context());
        let err = session.confirm_crop().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidState {
                state: SlotState::Empty
            }
        ));
    }

    #[tokio::test]
    async fn test_concurrent_confirm_is_busy() {
        let backend = Arc::new(SlowFirstComposite::new());
        let store = Arc::new(StagingStore::new());
        let session = Arc::new(UploadSession::new(
            avatar_context(),
            Arc::clone(&store),
            backend.clone(),
        ));

        session.select_file(png_file("photo.png", 100, 75)).await.unwrap();

        let first = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.confirm_crop().await })
        };
        backend.started.notified().await;

        let second = session.confirm_crop().await;
        assert!(matches!(second, Err(SessionError::Busy)));

        backend.release.notify_one();
        assert!(first.await.unwrap().is_ok());
        assert_eq!(session.state(), SlotState::Previewing);
    }

    #[tokio::test]
    async fn test_stale_selection_is_superseded() {
        let backend = Arc::new(SlowFirstDecode::new());
        let store = Arc::new(StagingStore::new());
        let session = Arc::new(UploadSession::new(
            avatar_context(),
            Arc::clone(&store),
            backend.clone(),
        ));

        // Selection A parks inside the backend decode.
        let slow = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.select_file(png_file("a.png", 60, 60)).await })
        };
        backend.started.notified().await;

        // Selection B lands while A is still in flight.
        let outcome = session.select_file(png_file("b.png", 80, 75)).await.unwrap();
        assert_applied_valid(&outcome);

        // A finishes late and must not win.
        backend.release.notify_one();
        let stale = slow.await.unwrap().unwrap();
        assert!(matches!(stale, SelectOutcome::Superseded));

        assert_eq!(session.state(), SlotState::Cropping);
        assert_eq!(
            session.cropper().unwrap().source,
            Dimensions::new(80, 75)
        );
    }

    #[tokio::test]
    async fn test_set_zoom_clamps_and_rescales() {
        let (session, _store) = new_session(avatar_context());
        session.select_file(png_file("photo.png", 100, 75)).await.unwrap();

        let effective = session.set_zoom(2.0).unwrap();
        assert!((effective - 2.0).abs() < 1e-9);
        let view = session.cropper().unwrap();
        // The selection halves about its center
        assert!((view.crop.width - 37.5).abs() < 1e-9);
        assert!((view.crop.height - 50.0).abs() < 1e-9);

        // Above the range cap
        assert!((session.set_zoom(5.0).unwrap() - 3.0).abs() < 1e-9);
        // Below the floor
        assert!((session.set_zoom(0.2).unwrap() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_zoom_and_rotation_toggles() {
        let mut ctx = avatar_context();
        ctx.allow_zoom = false;
        let (session, _store) = new_session(ctx);
        session.select_file(png_file("photo.png", 100, 75)).await.unwrap();

        assert!(matches!(
            session.set_zoom(2.0),
            Err(SessionError::ZoomDisabled)
        ));
        // Rotation is still allowed in this context
        assert!(session.set_rotation(90.0).is_ok());

        let mut ctx = avatar_context();
        ctx.allow_rotation = false;
        let (session, _store) = new_session(ctx);
        session.select_file(png_file("photo.png", 100, 75)).await.unwrap();

        assert!(matches!(
            session.set_rotation(90.0),
            Err(SessionError::RotationDisabled)
        ));
        assert!(matches!(
            session.set_flip(Flip::Horizontal),
            Err(SessionError::RotationDisabled)
        ));
        assert!(session.set_zoom(1.5).is_ok());
    }

    #[tokio::test]
    async fn test_rotation_reshapes_surface() {
        let (session, _store) = new_session(avatar_context());
        session.select_file(png_file("photo.png", 100, 75)).await.unwrap();

        session.set_rotation(90.0).unwrap();
        let view = session.cropper().unwrap();
        assert_eq!(view.surface, Dimensions::new(75, 100));
        // Selection re-centered over the new surface: maximal square is
        // now 75 wide, which is 100% of the width and 75% of the height
        assert!((view.crop.width - 100.0).abs() < 1e-9);
        assert!((view.crop.height - 75.0).abs() < 1e-9);
        assert!((view.crop.y - 12.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_edit_cycle_leaves_no_orphans() {
        let (session, store) = new_session(avatar_context());
        session.select_file(png_file("photo.png", 100, 75)).await.unwrap();

        let first = session.confirm_crop().await.unwrap();
        assert_eq!(store.len(), 1);

        session.edit().unwrap();
        assert_eq!(session.state(), SlotState::Cropping);
        assert!(session.staged().is_none());
        assert!(store.is_empty());

        session.set_zoom(2.0).unwrap();
        let second = session.confirm_crop().await.unwrap();
        assert_ne!(first, second);
        assert_eq!(store.len(), 1);
        assert!(!store.contains(&first));
        assert!(store.contains(&second));
    }

    #[tokio::test]
    async fn test_edit_unavailable_for_direct_contexts() {
        let (session, _store) = new_session(banner_context());
        session.select_file(png_file("banner.png", 97, 25)).await.unwrap();
        assert_eq!(session.state(), SlotState::Previewing);

        assert!(matches!(
            session.edit(),
            Err(SessionError::CroppingDisabled)
        ));
    }

    #[tokio::test]
    async fn test_remove_discards_and_terminates() {
        let (session, store) = new_session(avatar_context());
        session.select_file(png_file("photo.png", 100, 75)).await.unwrap();
        session.confirm_crop().await.unwrap();
        assert_eq!(store.len(), 1);

        session.remove().unwrap();
        assert_eq!(session.state(), SlotState::Removed);
        assert!(store.is_empty());
        assert!(session.staged().is_none());

        // Idempotent
        session.remove().unwrap();
        assert_eq!(session.state(), SlotState::Removed);

        // Terminal: no new selections
        let err = session.select_file(png_file("photo.png", 100, 75)).await;
        assert!(matches!(
            err,
            Err(SessionError::InvalidState {
                state: SlotState::Removed
            })
        ));
    }

    #[test]
    fn test_remove_from_empty() {
        let (session, _store) = new_session(avatar_context());
        session.remove().unwrap();
        assert_eq!(session.state(), SlotState::Removed);
    }

    #[tokio::test]
    async fn test_commit_full_cycle() {
        let observer = Arc::new(RecordingObserver::default());
        let store = Arc::new(StagingStore::new());
        let session = UploadSession::new(
            avatar_context(),
            Arc::clone(&store),
            Arc::new(SoftwareBackend),
        )
        .with_observer(observer.clone());

        session.select_file(png_file("photo.png", 100, 75)).await.unwrap();
        session.confirm_crop().await.unwrap();

        let transfer = CountingTransfer::new("uploads/avatar/1.jpg");
        let key = session.commit(&transfer).await.unwrap();

        assert_eq!(key, "uploads/avatar/1.jpg");
        assert_eq!(session.state(), SlotState::Committed);
        assert_eq!(session.committed_key().as_deref(), Some("uploads/avatar/1.jpg"));

        // The form hears about the handle at staging time and the key at
        // commit time, both with the same derivation.
        let completions = observer.completions.lock().unwrap();
        assert_eq!(completions.len(), 2);
        assert!(completions[0].0.starts_with("staged://avatar/"));
        assert_eq!(completions[1].0, "uploads/avatar/1.jpg");
        assert_eq!(completions[0].1, Dimensions::new(54, 54));
        assert_eq!(completions[1].1, Dimensions::new(54, 54));

        assert_eq!(
            *observer.events.lock().unwrap(),
            vec![
                (SlotState::Empty, SlotState::Validating),
                (SlotState::Validating, SlotState::Cropping),
                (SlotState::Cropping, SlotState::Previewing),
                (SlotState::Previewing, SlotState::Committing),
                (SlotState::Committing, SlotState::Committed),
            ]
        );
    }

    #[tokio::test]
    async fn test_commit_is_idempotent() {
        let (session, _store) = new_session(avatar_context());
        session.select_file(png_file("photo.png", 100, 75)).await.unwrap();
        session.confirm_crop().await.unwrap();

        let transfer = CountingTransfer::new("uploads/avatar/1.jpg");

        let first = session.commit(&transfer).await.unwrap();
        let second = session.commit(&transfer).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(transfer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_overlapping_commits_share_one_transfer() {
        let (session, _store) = new_session(avatar_context());
        session.select_file(png_file("photo.png", 100, 75)).await.unwrap();
        session.confirm_crop().await.unwrap();

        let transfer = CountingTransfer::new("uploads/avatar/1.jpg");
        let (a, b) = tokio::join!(session.commit(&transfer), session.commit(&transfer));

        assert_eq!(a.unwrap(), "uploads/avatar/1.jpg");
        assert_eq!(b.unwrap(), "uploads/avatar/1.jpg");
        assert_eq!(transfer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), SlotState::Committed);
    }

    #[tokio::test]
    async fn test_commit_during_commit_joins_in_flight_transfer() {
        let (session, _store) = new_session(avatar_context());
        session.select_file(png_file("photo.png", 100, 75)).await.unwrap();
        session.confirm_crop().await.unwrap();

        let transfer = Arc::new(BlockingTransfer::new());
        let first = {
            let session = Arc::clone(&session);
            let transfer = Arc::clone(&transfer);
            tokio::spawn(async move { session.commit(transfer.as_ref()).await })
        };
        transfer.started.notified().await;
        assert_eq!(session.state(), SlotState::Committing);

        let second = {
            let session = Arc::clone(&session);
            let transfer = Arc::clone(&transfer);
            tokio::spawn(async move { session.commit(transfer.as_ref()).await })
        };
        transfer.release.notify_one();

        let a = first.await.unwrap().unwrap();
        let b = second.await.unwrap().unwrap();
        assert_eq!(a, "uploads/slow.jpg");
        assert_eq!(b, a);
        assert_eq!(transfer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), SlotState::Committed);
    }

    #[tokio::test]
    async fn test_commit_failure_keeps_handle() {
        let observer = Arc::new(RecordingObserver::default());
        let store = Arc::new(StagingStore::new());
        let session = UploadSession::new(
            avatar_context(),
            Arc::clone(&store),
            Arc::new(SoftwareBackend),
        )
        .with_observer(observer.clone());

        session.select_file(png_file("photo.png", 100, 75)).await.unwrap();
        let handle = session.confirm_crop().await.unwrap();

        let err = session.commit(&FailingTransfer).await;
        assert!(matches!(err, Err(SessionError::Upload(_))));

        // Back to Previewing with the staged binary untouched
        assert_eq!(session.state(), SlotState::Previewing);
        assert!(store.contains(&handle));
        assert_eq!(session.staged().unwrap().handle(), &handle);
        assert_eq!(observer.errors.lock().unwrap().len(), 1);

        // A retry with a working transfer succeeds
        let transfer = CountingTransfer::new("uploads/avatar/retry.jpg");
        let key = session.commit(&transfer).await.unwrap();
        assert_eq!(key, "uploads/avatar/retry.jpg");
        assert_eq!(session.state(), SlotState::Committed);
    }

    #[tokio::test]
    async fn test_remove_during_commit() {
        let (session, store) = new_session(avatar_context());
        session.select_file(png_file("photo.png", 100, 75)).await.unwrap();
        session.confirm_crop().await.unwrap();

        let transfer = Arc::new(BlockingTransfer::new());
        let committing = {
            let session = Arc::clone(&session);
            let transfer = Arc::clone(&transfer);
            tokio::spawn(async move { session.commit(transfer.as_ref()).await })
        };
        transfer.started.notified().await;

        // The user clears the slot while the transfer is in flight.
        session.remove().unwrap();
        assert_eq!(session.state(), SlotState::Removed);
        assert!(store.is_empty());

        transfer.release.notify_one();
        let key = committing.await.unwrap().unwrap();

        // The transfer completed and its key is recorded, but the slot
        // stays removed.
        assert_eq!(key, "uploads/slow.jpg");
        assert_eq!(session.state(), SlotState::Removed);
        assert_eq!(session.committed_key().as_deref(), Some("uploads/slow.jpg"));
    }

    #[tokio::test]
    async fn test_full_resolution_avatar_flow() {
        let mut ctx = ImageContext::new("avatar", 1080, 1080);
        ctx.aspect_ratio = Some(1.0);
        let (session, _store) = new_session(ctx);

        session.select_file(png_file("photo.png", 2000, 1500)).await.unwrap();
        let view = session.cropper().unwrap();
        assert!((view.min_zoom - 1.0).abs() < 1e-9);

        session.confirm_crop().await.unwrap();
        let entry = session.staged().unwrap();
        assert_eq!(entry.derivation().output, Dimensions::new(1080, 1080));
        assert_eq!(entry.derivation().crop, anteroom_core::PixelCrop::new(250, 0, 1500, 1500));
    }

    #[test]
    fn test_derived_file_name() {
        assert_eq!(derived_file_name("photo.png", EncodeFormat::Jpeg), "photo.jpg");
        assert_eq!(derived_file_name("photo.jpeg", EncodeFormat::Jpeg), "photo.jpg");
        assert_eq!(derived_file_name("archive.tar.gz", EncodeFormat::Png), "archive.tar.png");
        assert_eq!(derived_file_name("noext", EncodeFormat::Jpeg), "noext.jpg");
        assert_eq!(derived_file_name(".hidden", EncodeFormat::Png), ".hidden.png");
    }
}
