// SPDX-License-Identifier: GPL-3.0-only

//! Value types exchanged with the session manager

use crate::backends::camera::{CameraDevice, Facing};
use crate::backends::permissions::{Capability, PermissionState};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// What the session is doing with the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No device bound
    #[default]
    Idle,
    /// Device bound and ready for a capture
    Previewing,
    /// A photo capture is in flight
    CapturingPhoto,
    /// A recording is running (or finishing after a stop request)
    Recording,
}

impl SessionState {
    /// Whether a capture currently owns the device
    pub fn is_capturing(&self) -> bool {
        matches!(self, SessionState::CapturingPhoto | SessionState::Recording)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Previewing => write!(f, "previewing"),
            SessionState::CapturingPhoto => write!(f, "capturing a photo"),
            SessionState::Recording => write!(f, "recording"),
        }
    }
}

/// A bound camera device
///
/// Each bind produces a handle with a fresh id; binding again (or tearing
/// down) invalidates every earlier handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    id: Uuid,
    facing: Facing,
    device: CameraDevice,
}

impl DeviceHandle {
    pub(crate) fn new(facing: Facing, device: CameraDevice) -> Self {
        Self {
            id: Uuid::new_v4(),
            facing,
            device,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Facing that was requested when binding
    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn device(&self) -> &CameraDevice {
        &self.device
    }
}

/// Outcome of one capture request
///
/// Produced once per request and moved to the caller; it is deliberately not
/// `Clone`.
#[must_use]
#[derive(Debug, PartialEq, Eq)]
pub enum CaptureResult {
    PhotoSaved { path: PathBuf },
    VideoSaved { path: PathBuf },
    Failed { reason: String },
}

impl CaptureResult {
    pub(crate) fn failed(reason: impl Into<String>) -> Self {
        CaptureResult::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, CaptureResult::Failed { .. })
    }

    /// Temporary file holding the capture, if it succeeded
    pub fn path(&self) -> Option<&Path> {
        match self {
            CaptureResult::PhotoSaved { path } | CaptureResult::VideoSaved { path } => Some(path),
            CaptureResult::Failed { .. } => None,
        }
    }
}

/// Camera and microphone grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PermissionSet {
    pub camera: PermissionState,
    pub microphone: PermissionState,
}

impl PermissionSet {
    pub fn get(&self, capability: Capability) -> PermissionState {
        match capability {
            Capability::Camera => self.camera,
            Capability::Microphone => self.microphone,
        }
    }

    pub fn set(&mut self, capability: Capability, state: PermissionState) {
        match capability {
            Capability::Camera => self.camera = state,
            Capability::Microphone => self.microphone = state,
        }
    }

    pub fn all_granted(&self) -> bool {
        self.camera.is_granted() && self.microphone.is_granted()
    }
}

/// Everything a UI shell renders, published on every change
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub permissions: PermissionSet,
    pub device_id: Option<Uuid>,
    pub device_name: Option<String>,
}
