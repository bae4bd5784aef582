// SPDX-License-Identifier: MPL-2.0

//! Camera Session - capture session lifecycle for a camera application
//!
//! This library coordinates camera hardware acquisition, camera and
//! microphone permissions, and photo/video capture requests so that captures
//! never race each other and the device is released on every exit path.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`session`]: The capture session manager and its state machine
//! - [`backends`]: Camera backends (V4L2, simulated) and permission providers
//! - [`storage`]: Moving finished captures into the gallery
//! - [`config`]: User configuration handling
//! - [`errors`]: Error types shared by the modules above
//!
//! # Example
//!
//! ```ignore
//! let session = CaptureSessionManager::new(backend, permissions);
//! session.request_permissions().await;
//! session.bind_device(Facing::Back)?;
//! let result = session.take_photo(PhotoOptions::default()).await?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use backends::camera::{CameraBackend, Facing, PhotoOptions, RecordingOptions};
pub use backends::permissions::{Capability, PermissionProvider, PermissionState};
pub use config::Config;
pub use errors::{AppError, AppResult, SessionError, SessionResult};
pub use session::{
    CaptureResult, CaptureSessionManager, DeviceHandle, RecordingCompletion, SessionSnapshot,
    SessionState,
};
