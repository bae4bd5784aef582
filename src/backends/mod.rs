// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for capture hardware and permissions
//!
//! This module provides the collaborators the session manager drives:
//! - Camera capture via V4L2 or a simulated device
//! - Camera and microphone permission state
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            CaptureSessionManager            │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                  │
//! │  ┌─────────────┐    ┌──────────────────┐    │
//! │  │ Permissions │    │     Camera       │    │
//! │  │ (dev nodes) │    │ (V4L2/Simulated) │    │
//! │  └─────────────┘    └──────────────────┘    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Camera backends with device enumeration and capture
//! - [`permissions`]: Permission providers for camera and microphone

pub mod camera;
pub mod permissions;
