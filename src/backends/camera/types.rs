// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Camera backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CameraBackendType {
    /// In-process simulated camera, no hardware required
    #[default]
    Simulated,
    /// Video4Linux2 capture nodes (/dev/video*)
    V4l2,
}

impl std::fmt::Display for CameraBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraBackendType::Simulated => write!(f, "simulated"),
            CameraBackendType::V4l2 => write!(f, "V4L2"),
        }
    }
}

impl FromStr for CameraBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" | "sim" => Ok(CameraBackendType::Simulated),
            "v4l2" | "v4l" => Ok(CameraBackendType::V4l2),
            other => Err(format!("unknown backend '{}' (expected simulated or v4l2)", other)),
        }
    }
}

/// Which way a camera faces relative to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Faces the user (selfie camera)
    Front,
    /// Faces away from the user
    #[default]
    Back,
    /// Detachable or desktop camera with no mounting position
    External,
}

impl Facing {
    pub const ALL: [Facing; 3] = [Facing::Front, Facing::Back, Facing::External];

    pub fn as_str(&self) -> &'static str {
        match self {
            Facing::Front => "front",
            Facing::Back => "back",
            Facing::External => "external",
        }
    }

    /// Map a location hint (device tree, driver or product name) to a facing
    ///
    /// Returns `None` when the hint says nothing about placement.
    pub fn from_location_hint(hint: &str) -> Option<Self> {
        let hint = hint.to_ascii_lowercase();
        if hint.contains("front") || hint.contains("user") || hint.contains("selfie") {
            Some(Facing::Front)
        } else if hint.contains("back") || hint.contains("rear") || hint.contains("environment")
        {
            Some(Facing::Back)
        } else if hint.contains("external") || hint.contains("usb") {
            Some(Facing::External)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Facing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Facing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" => Ok(Facing::Front),
            "back" | "rear" => Ok(Facing::Back),
            "external" => Ok(Facing::External),
            other => Err(format!(
                "unknown facing '{}' (expected front, back or external)",
                other
            )),
        }
    }
}

/// Represents a camera device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    /// Human readable name (V4L2 card name, simulated label)
    pub name: String,
    /// Backend specific device path (e.g. /dev/video0)
    pub path: String,
    /// Mounting position of the sensor
    pub facing: Facing,
    /// Kernel driver name, when the backend knows it
    pub driver: Option<String>,
}

/// How the capture pipeline trades speed against image quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPrioritization {
    Speed,
    Balanced,
    #[default]
    Quality,
}

impl QualityPrioritization {
    /// JPEG quality used when the backend encodes the frame itself
    pub fn jpeg_quality(&self) -> u8 {
        match self {
            QualityPrioritization::Speed => 70,
            QualityPrioritization::Balanced => 85,
            QualityPrioritization::Quality => 95,
        }
    }

    /// Number of frames to discard before grabbing the photo frame
    ///
    /// Auto exposure converges during the first frames after the stream starts.
    pub fn warmup_frames(&self) -> u32 {
        match self {
            QualityPrioritization::Speed => 1,
            QualityPrioritization::Balanced => 3,
            QualityPrioritization::Quality => 6,
        }
    }
}

impl FromStr for QualityPrioritization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "speed" => Ok(QualityPrioritization::Speed),
            "balanced" => Ok(QualityPrioritization::Balanced),
            "quality" => Ok(QualityPrioritization::Quality),
            other => Err(format!(
                "unknown quality '{}' (expected speed, balanced or quality)",
                other
            )),
        }
    }
}

/// Flash behaviour for a photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashMode {
    Off,
    On,
    #[default]
    Auto,
}

impl FromStr for FlashMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(FlashMode::Off),
            "on" => Ok(FlashMode::On),
            "auto" => Ok(FlashMode::Auto),
            other => Err(format!("unknown flash mode '{}' (expected off, on or auto)", other)),
        }
    }
}

/// Options for a single photo capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoOptions {
    pub quality: QualityPrioritization,
    pub flash: FlashMode,
    pub red_eye_reduction: bool,
}

impl Default for PhotoOptions {
    fn default() -> Self {
        Self {
            quality: QualityPrioritization::Quality,
            flash: FlashMode::Auto,
            red_eye_reduction: true,
        }
    }
}

/// Options for a video recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingOptions {
    /// Record the microphone alongside video (requires microphone permission)
    pub audio: bool,
    /// Backend finishes the clip on its own after this long
    pub max_duration: Option<Duration>,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            audio: true,
            max_duration: None,
        }
    }
}

/// What a backend reports when a recording ends
pub type RecordingOutcome = BackendResult<PathBuf>;

/// One-shot completion channel handed to the backend on recording start
pub type RecordingCompletionSender = tokio::sync::oneshot::Sender<RecordingOutcome>;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Backend is not available on this system
    NotAvailable(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// Operation needs an open device
    NotOpen,
    /// Device is held by another process
    DeviceBusy(String),
    /// Frame capture or encoding failed
    CaptureFailed(String),
    /// Recording already in progress
    RecordingInProgress,
    /// No recording in progress
    NoRecordingInProgress,
    /// Recording was discarded before it finished
    Cancelled,
    /// General I/O error
    IoError(String),
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::NotOpen => write!(f, "No camera device is open"),
            BackendError::DeviceBusy(msg) => write!(f, "Device busy: {}", msg),
            BackendError::CaptureFailed(msg) => write!(f, "Capture failed: {}", msg),
            BackendError::RecordingInProgress => write!(f, "Recording already in progress"),
            BackendError::NoRecordingInProgress => write!(f, "No recording in progress"),
            BackendError::Cancelled => write!(f, "Recording cancelled"),
            BackendError::IoError(msg) => write!(f, "I/O error: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::ResourceBusy => BackendError::DeviceBusy(err.to_string()),
            _ => BackendError::IoError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facing_from_location_hint() {
        assert_eq!(Facing::from_location_hint("Front Camera"), Some(Facing::Front));
        assert_eq!(Facing::from_location_hint("rear sensor"), Some(Facing::Back));
        assert_eq!(Facing::from_location_hint("USB Video"), Some(Facing::External));
        assert_eq!(Facing::from_location_hint("Integrated Camera"), None);
    }

    #[test]
    fn test_facing_parse() {
        assert_eq!("BACK".parse::<Facing>(), Ok(Facing::Back));
        assert_eq!("rear".parse::<Facing>(), Ok(Facing::Back));
        assert!("sideways".parse::<Facing>().is_err());
    }

    #[test]
    fn test_photo_options_default() {
        let options = PhotoOptions::default();
        assert_eq!(options.quality, QualityPrioritization::Quality);
        assert_eq!(options.flash, FlashMode::Auto);
        assert!(options.red_eye_reduction);
    }

    #[test]
    fn test_quality_ordering() {
        assert!(
            QualityPrioritization::Speed.jpeg_quality()
                < QualityPrioritization::Quality.jpeg_quality()
        );
        assert!(
            QualityPrioritization::Speed.warmup_frames()
                < QualityPrioritization::Quality.warmup_frames()
        );
    }

    #[test]
    fn test_recording_defaults_to_audio() {
        assert!(RecordingOptions::default().audio);
        assert_eq!(RecordingOptions::default().max_duration, None);
    }
}
