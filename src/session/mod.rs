// SPDX-License-Identifier: GPL-3.0-only

//! Capture session lifecycle
//!
//! [`CaptureSessionManager`] is the single gateway to the camera. It owns
//! the bound device, the camera and microphone grants, and the
//! [`SessionState`] that serializes captures:
//!
//! ```text
//! Idle --bind_device--> Previewing
//! Previewing --take_photo--> CapturingPhoto --(done)--> Previewing
//! Previewing --start_recording--> Recording --stop/(error)--> Previewing
//! any --teardown--> Idle
//! ```
//!
//! Every check-and-transition happens under one lock, so a request that finds
//! the state busy is rejected immediately instead of queued. Backend work
//! (photo capture, recording) runs outside the lock; its completion is
//! matched against a token so results from a previous binding are dropped.

mod completion;
mod types;

pub use completion::RecordingCompletion;
pub use types::{CaptureResult, DeviceHandle, PermissionSet, SessionSnapshot, SessionState};

use crate::backends::camera::{
    BackendError, CameraBackend, CameraDevice, Facing, PhotoOptions, RecordingOptions,
    RecordingOutcome,
};
use crate::backends::permissions::{Capability, PermissionProvider, PermissionState};
use crate::errors::{SessionError, SessionResult};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

const TORN_DOWN: &str = "session torn down";
const DEVICE_LOST: &str = "camera disconnected";
const PERMISSION_REVOKED: &str = "permission revoked";

/// Recording whose completion has not been delivered yet
struct PendingRecording {
    token: u64,
    result_tx: oneshot::Sender<CaptureResult>,
    stop_requested: bool,
    /// Whether the clip needs the microphone grant
    audio: bool,
}

struct Inner {
    state: SessionState,
    permissions: PermissionSet,
    device: Option<DeviceHandle>,
    recording: Option<PendingRecording>,
    /// Token of the capture currently owning the device
    active_token: u64,
    next_token: u64,
}

impl Inner {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            permissions: self.permissions,
            device_id: self.device.as_ref().map(DeviceHandle::id),
            device_name: self.device.as_ref().map(|d| d.device().name.clone()),
        }
    }

    fn issue_token(&mut self) -> u64 {
        self.next_token += 1;
        self.active_token = self.next_token;
        self.active_token
    }

    /// Gate shared by both capture operations
    fn check_capture(&self, operation: &'static str) -> SessionResult<()> {
        match self.state {
            SessionState::Previewing => {}
            SessionState::CapturingPhoto | SessionState::Recording => {
                return Err(SessionError::Busy);
            }
            SessionState::Idle => {
                return Err(SessionError::InvalidState {
                    operation,
                    state: self.state,
                });
            }
        }
        if self.device.is_none() {
            return Err(SessionError::InvalidState {
                operation,
                state: self.state,
            });
        }
        if !self.permissions.camera.is_granted() {
            return Err(SessionError::PermissionDenied(Capability::Camera));
        }
        Ok(())
    }
}

struct Shared {
    backend: Arc<dyn CameraBackend>,
    permissions: Arc<dyn PermissionProvider>,
    inner: Mutex<Inner>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &Inner) {
        self.snapshots.send_replace(inner.snapshot());
    }

    /// Release everything and go back to Idle
    ///
    /// Never waits on the backend: `close` only signals capture threads.
    fn teardown_locked(&self, inner: &mut Inner, reason: &str) {
        if let Some(pending) = inner.recording.take() {
            debug!(token = pending.token, reason, "Failing active recording");
            if pending.result_tx.send(CaptureResult::failed(reason)).is_err() {
                debug!("Recording completion was already dropped");
            }
        }
        if inner.state == SessionState::CapturingPhoto {
            debug!(reason, "Photo in flight will be discarded");
        }

        let had_device = inner.device.take().is_some();
        self.backend.close();

        // Outstanding photo guards and recording tasks now hold a stale token
        inner.active_token = 0;
        inner.state = SessionState::Idle;
        self.publish(inner);

        if had_device {
            info!(reason, "Capture session released the camera");
        }
    }

    /// End an active recording whose grants were withdrawn
    ///
    /// A photo in flight cannot be interrupted; its guard drops the result
    /// instead (see [`PhotoGuard::release`]).
    fn enforce_grants(&self, inner: &mut Inner) {
        let camera = inner.permissions.camera.is_granted();
        let microphone = inner.permissions.microphone.is_granted();

        let Some(pending) = inner
            .recording
            .take_if(|p| !camera || (p.audio && !microphone))
        else {
            return;
        };

        warn!(
            token = pending.token,
            camera = %inner.permissions.camera,
            microphone = %inner.permissions.microphone,
            "Recording permission revoked, cancelling"
        );
        self.backend.cancel_recording();
        if pending.result_tx.send(CaptureResult::failed(PERMISSION_REVOKED)).is_err() {
            debug!("Recording completion was already dropped");
        }
        if inner.state == SessionState::Recording {
            inner.state = SessionState::Previewing;
        }
    }

    /// Deliver the backend's recording outcome
    fn finish_recording(&self, token: u64, outcome: Result<RecordingOutcome, oneshot::error::RecvError>) {
        let mut inner = self.lock();

        let Some(pending) = inner.recording.take_if(|p| p.token == token) else {
            debug!(token, "Ignoring completion of a recording that is no longer active");
            if let Ok(Ok(path)) = outcome {
                discard_capture(&path);
            }
            return;
        };

        let result = match outcome {
            Ok(Ok(path)) => {
                info!(path = %path.display(), "Recording finished");
                CaptureResult::VideoSaved { path }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Recording failed");
                CaptureResult::failed(e.to_string())
            }
            Err(_) => {
                warn!("Backend dropped the recording completion");
                CaptureResult::failed("recording ended without a result")
            }
        };

        if inner.state == SessionState::Recording {
            inner.state = SessionState::Previewing;
        }
        self.publish(&inner);
        drop(inner);

        if let Err(unclaimed) = pending.result_tx.send(result) {
            if let Some(path) = unclaimed.path() {
                warn!(path = %path.display(), "Nobody awaited the recording, clip left in place");
            }
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let backend = Arc::clone(&self.backend);
        let snapshots = &self.snapshots;
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if inner.state != SessionState::Idle || inner.device.is_some() {
            debug!("Capture session dropped, tearing down");
            if let Some(pending) = inner.recording.take()
                && pending.result_tx.send(CaptureResult::failed(TORN_DOWN)).is_err()
            {
                debug!("Recording completion was already dropped");
            }
            inner.device = None;
            inner.state = SessionState::Idle;
            backend.close();
            snapshots.send_replace(inner.snapshot());
        }
    }
}

fn discard_capture(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        debug!(path = %path.display(), error = %e, "Could not remove discarded capture");
    }
}

/// How a finished photo relates to the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    /// The capture still owned the session
    Current,
    /// It owned the session, but the camera grant was withdrawn meanwhile
    Revoked,
    /// The session was torn down or rebound meanwhile
    Stale,
}

/// Returns the session to Previewing when a photo capture ends
///
/// Lives on the blocking task running the capture, so the release happens
/// when the hardware is actually done, even if the caller stopped waiting or
/// the backend panicked.
struct PhotoGuard {
    shared: Arc<Shared>,
    token: u64,
    released: bool,
}

impl PhotoGuard {
    /// Restore Previewing if this capture still owns the session
    fn release(&mut self) -> Release {
        if self.released {
            return Release::Stale;
        }
        self.released = true;

        let mut inner = self.shared.lock();
        if inner.state != SessionState::CapturingPhoto || inner.active_token != self.token {
            return Release::Stale;
        }
        inner.state = SessionState::Previewing;
        self.shared.publish(&inner);

        if inner.permissions.camera.is_granted() {
            Release::Current
        } else {
            Release::Revoked
        }
    }

    fn finish(mut self, outcome: Result<PathBuf, BackendError>) -> CaptureResult {
        let release = self.release();
        match outcome {
            Ok(path) if release == Release::Current => {
                debug!(path = %path.display(), "Photo captured");
                CaptureResult::PhotoSaved { path }
            }
            Ok(path) => {
                discard_capture(&path);
                if release == Release::Revoked {
                    warn!("Camera permission revoked during capture, photo discarded");
                    CaptureResult::failed(PERMISSION_REVOKED)
                } else {
                    CaptureResult::failed(TORN_DOWN)
                }
            }
            Err(e) => {
                warn!(error = %e, "Photo capture failed");
                CaptureResult::failed(e.to_string())
            }
        }
    }
}

impl Drop for PhotoGuard {
    fn drop(&mut self) {
        if !self.released && self.release() != Release::Stale {
            warn!("Photo capture ended abnormally, session restored");
        }
    }
}

/// Serialized gateway to one camera device
///
/// Cheap to clone; all clones share the same session. The session is torn
/// down (device released, recording failed) when the last clone is dropped.
#[derive(Clone)]
pub struct CaptureSessionManager {
    shared: Arc<Shared>,
}

impl CaptureSessionManager {
    pub fn new(backend: Arc<dyn CameraBackend>, permissions: Arc<dyn PermissionProvider>) -> Self {
        let inner = Inner {
            state: SessionState::Idle,
            permissions: PermissionSet::default(),
            device: None,
            recording: None,
            active_token: 0,
            next_token: 0,
        };
        let (snapshots, _) = watch::channel(inner.snapshot());

        Self {
            shared: Arc::new(Shared {
                backend,
                permissions,
                inner: Mutex::new(inner),
                snapshots,
            }),
        }
    }

    // ===== Permissions =====

    /// Resolve camera and microphone grants, prompting for undecided ones
    ///
    /// A dismissed prompt counts as Denied.
    pub async fn request_permissions(&self) -> PermissionSet {
        let provider = &self.shared.permissions;
        let mut resolved = PermissionSet::default();

        for capability in Capability::ALL {
            let mut state = provider.status(capability);
            if state == PermissionState::Unknown {
                state = provider.request(capability).await;
            }
            if state == PermissionState::Unknown {
                debug!(%capability, "Permission prompt dismissed");
                state = PermissionState::Denied;
            }
            resolved.set(capability, state);
        }

        info!(
            camera = %resolved.camera,
            microphone = %resolved.microphone,
            "Permissions resolved"
        );

        let mut inner = self.shared.lock();
        inner.permissions = resolved;
        self.shared.enforce_grants(&mut inner);
        self.shared.publish(&inner);
        resolved
    }

    /// Last resolved grants, without prompting
    pub fn permissions(&self) -> PermissionSet {
        self.shared.lock().permissions
    }

    // ===== Device binding =====

    /// Devices the backend currently offers
    pub fn available_devices(&self) -> Vec<CameraDevice> {
        self.shared.backend.enumerate_cameras()
    }

    /// Bind the first device facing `facing`
    ///
    /// Replaces (and invalidates) any previous binding. When no device
    /// matches, the previous binding stays in place.
    pub fn bind_device(&self, facing: Facing) -> SessionResult<DeviceHandle> {
        let shared = &self.shared;
        let mut inner = shared.lock();

        if inner.state.is_capturing() {
            return Err(SessionError::Busy);
        }

        let device = shared
            .backend
            .enumerate_cameras()
            .into_iter()
            .find(|d| d.facing == facing)
            .ok_or(SessionError::NoDeviceFound(facing))?;

        if let Some(old) = inner.device.take() {
            debug!(old = %old.id(), "Invalidating previous device binding");
            shared.backend.close();
        }

        if let Err(e) = shared.backend.open(&device) {
            warn!(device = %device.name, error = %e, "Failed to open camera");
            inner.state = SessionState::Idle;
            shared.publish(&inner);
            return Err(e.into());
        }

        let handle = DeviceHandle::new(facing, device);
        info!(
            id = %handle.id(),
            device = %handle.device().name,
            path = %handle.device().path,
            %facing,
            "Camera bound"
        );

        inner.device = Some(handle.clone());
        inner.state = SessionState::Previewing;
        shared.publish(&inner);
        Ok(handle)
    }

    // ===== Capture =====

    /// Capture one photo
    ///
    /// Rejected with [`SessionError::Busy`] while another capture is in
    /// flight. Hardware failures come back as [`CaptureResult::Failed`] and
    /// the session returns to Previewing either way. There is no timeout:
    /// the call waits for the backend. Needs a Tokio runtime for the
    /// blocking capture.
    pub async fn take_photo(&self, options: PhotoOptions) -> SessionResult<CaptureResult> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            SessionError::HardwareFailure("photo capture requires a Tokio runtime".to_string())
        })?;

        let guard = {
            let mut inner = self.shared.lock();
            inner.check_capture("take a photo")?;

            let token = inner.issue_token();
            inner.state = SessionState::CapturingPhoto;
            self.shared.publish(&inner);
            PhotoGuard {
                shared: Arc::clone(&self.shared),
                token,
                released: false,
            }
        };

        debug!(token = guard.token, quality = ?options.quality, "Taking photo");

        let backend = Arc::clone(&self.shared.backend);
        let (result_tx, result_rx) = oneshot::channel();
        runtime.spawn_blocking(move || {
            let outcome = backend.capture_photo(&options);
            let result = guard.finish(outcome);
            if let Err(unclaimed) = result_tx.send(result)
                && let Some(path) = unclaimed.path()
            {
                debug!("Photo caller went away, discarding capture");
                discard_capture(path);
            }
        });

        Ok(result_rx
            .await
            .unwrap_or_else(|_| CaptureResult::failed("photo capture ended abnormally")))
    }

    /// Start a recording
    ///
    /// Returns once the backend accepted the request. The clip's outcome
    /// arrives exactly once through the returned [`RecordingCompletion`]; the
    /// session stays Recording until then. Needs a Tokio runtime to watch for
    /// the backend's completion.
    pub fn start_recording(&self, options: RecordingOptions) -> SessionResult<RecordingCompletion> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            SessionError::HardwareFailure("recording requires a Tokio runtime".to_string())
        })?;

        let shared = &self.shared;
        let mut inner = shared.lock();
        inner.check_capture("start recording")?;
        if options.audio && !inner.permissions.microphone.is_granted() {
            return Err(SessionError::PermissionDenied(Capability::Microphone));
        }

        let (backend_tx, backend_rx) = oneshot::channel();
        if let Err(e) = shared.backend.start_recording(&options, backend_tx) {
            warn!(error = %e, "Backend refused to start recording");
            return Err(e.into());
        }

        let token = inner.issue_token();
        let (result_tx, result_rx) = oneshot::channel();
        inner.recording = Some(PendingRecording {
            token,
            result_tx,
            stop_requested: false,
            audio: options.audio,
        });
        inner.state = SessionState::Recording;
        shared.publish(&inner);
        drop(inner);

        info!(token, audio = options.audio, max_duration = ?options.max_duration, "Recording started");

        let weak: Weak<Shared> = Arc::downgrade(shared);
        runtime.spawn(async move {
            let outcome = backend_rx.await;
            match weak.upgrade() {
                Some(shared) => shared.finish_recording(token, outcome),
                None => {
                    if let Ok(Ok(path)) = outcome {
                        discard_capture(&path);
                    }
                }
            }
        });

        Ok(RecordingCompletion::new(result_rx))
    }

    /// Ask the active recording to finish
    ///
    /// The session stays Recording until the completion arrives. Fails with
    /// [`SessionError::InvalidState`] when nothing is recording.
    pub fn stop_recording(&self) -> SessionResult<()> {
        let shared = &self.shared;
        let mut inner = shared.lock();

        let state = inner.state;
        let pending = match (state, inner.recording.as_mut()) {
            (SessionState::Recording, Some(pending)) => pending,
            _ => {
                return Err(SessionError::InvalidState {
                    operation: "stop recording",
                    state,
                });
            }
        };

        if pending.stop_requested {
            debug!(token = pending.token, "Stop already requested");
            return Ok(());
        }

        match shared.backend.stop_recording() {
            Ok(()) => {
                pending.stop_requested = true;
                debug!(token = pending.token, "Recording stop requested");
                Ok(())
            }
            // Already finishing on its own; the completion is on its way
            Err(BackendError::NoRecordingInProgress) => {
                pending.stop_requested = true;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Backend failed to stop recording");
                shared.backend.cancel_recording();
                if let Some(pending) = inner.recording.take() {
                    let _ = pending.result_tx.send(CaptureResult::failed(e.to_string()));
                }
                inner.state = SessionState::Previewing;
                shared.publish(&inner);
                Err(e.into())
            }
        }
    }

    // ===== Lifecycle =====

    /// Release the device and cancel any capture, from any state
    ///
    /// Never blocks on the hardware. A later [`bind_device`](Self::bind_device)
    /// starts fresh.
    pub fn teardown(&self) {
        let mut inner = self.shared.lock();
        self.shared.teardown_locked(&mut inner, TORN_DOWN);
    }

    /// Report that the device behind `handle_id` disappeared
    ///
    /// Returns false (and does nothing) for a handle that is no longer bound.
    pub fn device_lost(&self, handle_id: Uuid) -> bool {
        let mut inner = self.shared.lock();
        if inner.device.as_ref().map(DeviceHandle::id) != Some(handle_id) {
            debug!(%handle_id, "Ignoring loss of a device that is not bound");
            return false;
        }
        warn!(%handle_id, "Bound camera disappeared");
        self.shared.teardown_locked(&mut inner, DEVICE_LOST);
        true
    }

    // ===== Queries =====

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    /// Currently bound device
    pub fn device(&self) -> Option<DeviceHandle> {
        self.shared.lock().device.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.lock().snapshot()
    }

    /// Receive a snapshot on every state, permission or binding change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshots.subscribe()
    }
}

impl std::fmt::Debug for CaptureSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSessionManager")
            .field("backend", &self.shared.backend.backend_type())
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
