// SPDX-License-Identifier: MPL-2.0

//! Error types for the capture session

use crate::backends::camera::{BackendError, Facing};
use crate::backends::permissions::Capability;
use crate::session::SessionState;
use std::fmt;
use std::path::PathBuf;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Capture session errors
    Session(SessionError),
    /// Configuration errors
    Config(ConfigError),
    /// Storage/filesystem errors
    Storage(StorageError),
    /// Generic error with message
    Other(String),
}

/// Errors returned by [`CaptureSessionManager`](crate::session::CaptureSessionManager)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The platform refused a capability the operation needs
    PermissionDenied(Capability),
    /// No device matches the requested facing
    NoDeviceFound(Facing),
    /// Another capture is in flight
    Busy,
    /// The operation is not allowed in the current state
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    /// The capture backend reported an error
    HardwareFailure(String),
}

/// Gallery storage errors
#[derive(Debug, Clone)]
pub enum StorageError {
    /// The capture file to persist does not exist
    MissingSource(PathBuf),
    /// No usable destination directory
    NoDestination,
    /// The capture failed, so there is nothing to save
    CaptureFailed(String),
    /// Copying or moving the file failed
    Io(String),
}

/// Configuration errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// No config directory on this system
    NoConfigDir,
    /// Reading or writing the file failed
    Io(String),
    /// The file is not valid JSON for [`Config`](crate::config::Config)
    Parse(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Session(e) => write!(f, "Session error: {}", e),
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
            AppError::Storage(e) => write!(f, "Storage error: {}", e),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::PermissionDenied(capability) => {
                write!(f, "Permission denied for {}", capability)
            }
            SessionError::NoDeviceFound(facing) => write!(f, "No {} camera found", facing),
            SessionError::Busy => write!(f, "Another capture is in progress"),
            SessionError::InvalidState { operation, state } => {
                write!(f, "Cannot {} while {}", operation, state)
            }
            SessionError::HardwareFailure(msg) => write!(f, "Hardware failure: {}", msg),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::MissingSource(path) => {
                write!(f, "Capture file {} does not exist", path.display())
            }
            StorageError::NoDestination => write!(f, "No gallery directory available"),
            StorageError::CaptureFailed(reason) => write!(f, "Capture failed: {}", reason),
            StorageError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoConfigDir => write!(f, "No configuration directory"),
            ConfigError::Io(msg) => write!(f, "I/O error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for SessionError {}
impl std::error::Error for StorageError {}
impl std::error::Error for ConfigError {}

// Conversions from sub-errors to AppError
impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        AppError::Session(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

// Backend errors surface to callers as hardware failures
impl From<BackendError> for SessionError {
    fn from(err: BackendError) -> Self {
        SessionError::HardwareFailure(err.to_string())
    }
}

// Conversions for I/O and serde errors
impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
