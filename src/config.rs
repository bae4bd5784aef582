// SPDX-License-Identifier: GPL-3.0-only

//! Persistent user settings
//!
//! Stored as pretty JSON in `<config dir>/camera-session/config.json`. Missing
//! fields take their defaults, so older files keep loading after new settings
//! are added.

use crate::backends::camera::{CameraBackendType, Facing, PhotoOptions, RecordingOptions};
use crate::constants::{APP_ID, DEFAULT_SAVE_FOLDER};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Current on-disk format version
pub const CONFIG_VERSION: u32 = 1;

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Format version of the file
    pub version: u32,
    /// Camera backend to use (V4L2 or simulated)
    pub backend: CameraBackendType,
    /// Facing bound when none is given on the command line
    pub default_facing: Facing,
    /// Options for every photo
    pub photo: PhotoOptions,
    /// Record the microphone with video
    pub record_audio: bool,
    /// Stop recordings automatically after this many seconds
    pub max_recording_secs: Option<u64>,
    /// Folder name under Pictures/Videos receiving captures
    pub save_folder: String,
    /// Last used camera device path
    pub last_camera_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            backend: CameraBackendType::V4l2,
            default_facing: Facing::Back,
            photo: PhotoOptions::default(),
            record_audio: true,
            max_recording_secs: None,
            save_folder: DEFAULT_SAVE_FOLDER.to_string(),
            last_camera_path: None,
        }
    }
}

impl Config {
    /// Default location of the config file
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_ID).join(CONFIG_FILE))
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            warn!("No config directory, using default settings");
            return Self::default();
        };

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if !path.exists() => {
                debug!(path = %path.display(), error = %e, "No config file yet");
                Self::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable config");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_json::from_str(&contents)?;

        if config.version > CONFIG_VERSION {
            warn!(
                found = config.version,
                supported = CONFIG_VERSION,
                "Config written by a newer version, unknown settings are ignored"
            );
        }
        config.version = CONFIG_VERSION;
        Ok(config)
    }

    /// Save to the default location
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Write atomically (temporary file, then rename)
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;

        debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Store `device_path` as the last used camera in the default file
    ///
    /// Returns whether the file changed.
    pub fn remember_camera(device_path: &str) -> Result<bool, ConfigError> {
        let path = Self::path().ok_or(ConfigError::NoConfigDir)?;
        Self::remember_camera_at(&path, device_path)
    }

    /// Store `device_path` as the last used camera in the file at `path`
    ///
    /// Only that field is touched: the rest is reloaded from disk, so
    /// settings overridden in memory for one run are never written back.
    pub fn remember_camera_at(path: &Path, device_path: &str) -> Result<bool, ConfigError> {
        let mut stored = if path.exists() {
            Self::load_from(path)?
        } else {
            Self::default()
        };
        if stored.last_camera_path.as_deref() == Some(device_path) {
            return Ok(false);
        }
        stored.last_camera_path = Some(device_path.to_string());
        stored.save_to(path)?;
        Ok(true)
    }

    /// Recording options derived from the settings
    pub fn recording_options(&self) -> RecordingOptions {
        RecordingOptions {
            audio: self.record_audio,
            max_duration: self.max_recording_secs.map(Duration::from_secs),
        }
    }
}
