// SPDX-License-Identifier: GPL-3.0-only

//! Permission providers for camera and microphone access
//!
//! The session manager only sees the [`PermissionProvider`] trait. Desktop
//! Linux has no runtime permission prompt, so [`DeviceAccessPermissions`]
//! derives the state from device node access. [`FixedPermissions`] scripts
//! the answers for tests and the simulated CLI mode.

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

/// A capability gated by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Camera,
    Microphone,
}

impl Capability {
    pub const ALL: [Capability; 2] = [Capability::Camera, Capability::Microphone];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Camera => "camera",
            Capability::Microphone => "microphone",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "camera" => Ok(Capability::Camera),
            "microphone" | "mic" => Ok(Capability::Microphone),
            other => Err(format!(
                "unknown capability '{}' (expected camera or microphone)",
                other
            )),
        }
    }
}

/// Grant status of one capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// Never asked
    #[default]
    Unknown,
    Granted,
    Denied,
}

impl PermissionState {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionState::Granted)
    }

    /// Whether the user (or platform) already answered
    pub fn is_decided(&self) -> bool {
        !matches!(self, PermissionState::Unknown)
    }
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionState::Unknown => write!(f, "unknown"),
            PermissionState::Granted => write!(f, "granted"),
            PermissionState::Denied => write!(f, "denied"),
        }
    }
}

/// Source of truth for capability grants
pub trait PermissionProvider: Send + Sync {
    /// Current status without prompting
    fn status(&self, capability: Capability) -> PermissionState;

    /// Prompt for a grant
    ///
    /// Resolves to `Unknown` when the prompt was dismissed without an answer.
    fn request(&self, capability: Capability) -> BoxFuture<'_, PermissionState>;
}

/// In-memory provider with a scripted prompt answer
#[derive(Debug)]
pub struct FixedPermissions {
    statuses: Mutex<HashMap<Capability, PermissionState>>,
    prompt_answer: Mutex<HashMap<Capability, PermissionState>>,
    prompts: AtomicUsize,
}

impl FixedPermissions {
    /// Nothing decided yet; prompts grant everything
    pub fn new() -> Self {
        Self {
            statuses: Mutex::new(HashMap::new()),
            prompt_answer: Mutex::new(
                Capability::ALL
                    .into_iter()
                    .map(|c| (c, PermissionState::Granted))
                    .collect(),
            ),
            prompts: AtomicUsize::new(0),
        }
    }

    /// Every capability already granted
    pub fn granted() -> Self {
        let permissions = Self::new();
        for capability in Capability::ALL {
            permissions.set_status(capability, PermissionState::Granted);
        }
        permissions
    }

    /// Answer given when `capability` is prompted (`Unknown` simulates a dismissal)
    pub fn with_prompt_answer(self, capability: Capability, answer: PermissionState) -> Self {
        self.prompt_answer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(capability, answer);
        self
    }

    pub fn with_status(self, capability: Capability, state: PermissionState) -> Self {
        self.set_status(capability, state);
        self
    }

    /// Change a status from outside, as a settings app would
    pub fn set_status(&self, capability: Capability, state: PermissionState) {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(capability, state);
    }

    /// Number of prompts shown so far
    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

impl Default for FixedPermissions {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionProvider for FixedPermissions {
    fn status(&self, capability: Capability) -> PermissionState {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&capability)
            .copied()
            .unwrap_or_default()
    }

    fn request(&self, capability: Capability) -> BoxFuture<'_, PermissionState> {
        async move {
            let current = self.status(capability);
            if current.is_decided() {
                return current;
            }

            self.prompts.fetch_add(1, Ordering::SeqCst);
            let answer = self
                .prompt_answer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&capability)
                .copied()
                .unwrap_or_default();

            debug!(%capability, %answer, "Scripted permission prompt answered");
            if answer.is_decided() {
                self.set_status(capability, answer);
            }
            answer
        }
        .boxed()
    }
}

/// Derives permission state from device node access
///
/// Camera access means read/write on a `video*` node, microphone access on
/// an ALSA capture node (`snd/pcmC*c`).
#[derive(Debug, Clone)]
pub struct DeviceAccessPermissions {
    dev_dir: PathBuf,
}

impl DeviceAccessPermissions {
    pub fn new() -> Self {
        Self::with_dev_dir("/dev")
    }

    pub fn with_dev_dir(dev_dir: impl Into<PathBuf>) -> Self {
        Self {
            dev_dir: dev_dir.into(),
        }
    }

    fn nodes(&self, capability: Capability) -> Vec<PathBuf> {
        let (dir, is_node): (PathBuf, fn(&str) -> bool) = match capability {
            Capability::Camera => (self.dev_dir.clone(), |name: &str| name.starts_with("video")),
            Capability::Microphone => (self.dev_dir.join("snd"), |name: &str| {
                name.starts_with("pcmC") && name.ends_with('c')
            }),
        };

        std::fs::read_dir(dir)
            .into_iter()
            .flatten()
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(is_node)
            })
            .collect()
    }
}

impl Default for DeviceAccessPermissions {
    fn default() -> Self {
        Self::new()
    }
}

/// Read/write access check for the current user
fn can_access(path: &Path) -> bool {
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call
    unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::W_OK) == 0 }
}

impl PermissionProvider for DeviceAccessPermissions {
    fn status(&self, capability: Capability) -> PermissionState {
        let nodes = self.nodes(capability);
        if nodes.is_empty() {
            return PermissionState::Unknown;
        }
        if nodes.iter().any(|node| can_access(node)) {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        }
    }

    fn request(&self, capability: Capability) -> BoxFuture<'_, PermissionState> {
        async move {
            match self.status(capability) {
                // No node to guard: binding reports the missing hardware instead
                PermissionState::Unknown => PermissionState::Granted,
                state => {
                    if state == PermissionState::Denied {
                        info!(%capability, "Device nodes exist but are not accessible (check the video/audio groups)");
                    }
                    state
                }
            }
        }
        .boxed()
    }
}
