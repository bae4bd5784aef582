// SPDX-License-Identifier: MPL-2.0
// Camera backend with trait-based abstraction for multiple capture stacks

//! Camera backend abstraction
//!
//! Backends own the device descriptor and the capture threads. They never
//! decide whether an operation is allowed; that is the session manager's job.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │   CLI / UI shell     │
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │CaptureSessionManager │  ← Permission gating, state machine
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │ CameraBackend Trait  │  ← Common interface
//! └──────────┬───────────┘
//!            │
//!       ┌────┴──────┐
//!       ▼           ▼
//!   ┌──────┐   ┌─────────┐
//!   │ V4L2 │   │Simulated│  ← Concrete implementations
//!   └──────┘   └─────────┘
//! ```

pub mod format_converters;
pub mod frame_loop;
pub mod recording;
pub mod simulated;
pub mod types;
pub mod v4l2;

pub use simulated::SimulatedBackend;
pub use types::*;
pub use v4l2::V4l2Backend;

use std::path::PathBuf;
use std::sync::Arc;

/// Complete camera backend trait
///
/// All camera backends must implement this trait to provide:
/// - Device enumeration
/// - Exclusive device acquisition and release
/// - Capture operations (photo, video)
///
/// Methods take `&self` so a backend can be shared with the threads that
/// drive recordings.
pub trait CameraBackend: Send + Sync {
    // ===== Metadata =====

    /// Get the backend type identifier
    fn backend_type(&self) -> CameraBackendType;

    /// Check if this backend is available on the current system
    fn is_available(&self) -> bool;

    // ===== Enumeration =====

    /// Enumerate available cameras on this backend
    fn enumerate_cameras(&self) -> Vec<CameraDevice>;

    // ===== Lifecycle =====

    /// Acquire a device, releasing any previously opened one
    ///
    /// # Returns
    /// * `Ok(())` - Device is held open until [`close`](Self::close)
    /// * `Err(BackendError::DeviceNotFound)` - The device disappeared
    /// * `Err(BackendError::DeviceBusy)` - Another process holds it
    fn open(&self, device: &CameraDevice) -> BackendResult<()>;

    /// Release the device and discard any active recording
    ///
    /// Must not block: teardown runs from arbitrary threads and from Drop.
    fn close(&self);

    // ===== Capture: Photo =====

    /// Capture a single photo into a temporary JPEG file
    ///
    /// Blocks until the frame is on disk; callers run it off the async
    /// executor.
    fn capture_photo(&self, options: &PhotoOptions) -> BackendResult<PathBuf>;

    // ===== Capture: Video =====

    /// Start recording to a temporary file
    ///
    /// Returns as soon as the device accepted the request. The outcome
    /// (final path or error) is sent exactly once on `completion`, whether
    /// the recording was stopped, hit its maximum duration, or failed.
    ///
    /// # Returns
    /// * `Ok(())` - Recording started
    /// * `Err(BackendError::RecordingInProgress)` - Already recording
    /// * `Err(BackendError)` - Failed to start recording
    fn start_recording(
        &self,
        options: &RecordingOptions,
        completion: RecordingCompletionSender,
    ) -> BackendResult<()>;

    /// Ask the active recording to finish (non-blocking)
    ///
    /// The finished file is reported on the completion channel.
    fn stop_recording(&self) -> BackendResult<()>;

    /// Discard the active recording, reporting [`BackendError::Cancelled`]
    fn cancel_recording(&self);
}

/// Get a concrete backend instance for the given type
pub fn get_backend_for_type(backend_type: CameraBackendType) -> Arc<dyn CameraBackend> {
    match backend_type {
        CameraBackendType::Simulated => Arc::new(SimulatedBackend::new()),
        CameraBackendType::V4l2 => Arc::new(V4l2Backend::new()),
    }
}

/// Get the default backend for real hardware
pub fn get_default_backend() -> CameraBackendType {
    CameraBackendType::V4l2
}
