// SPDX-License-Identifier: GPL-3.0-only

//! Simulated camera backend
//!
//! Renders a moving test pattern instead of talking to hardware. Photos are
//! real JPEG files and recordings are real MJPEG streams, so everything
//! downstream of the backend (session manager, storage sink, CLI) behaves the
//! same as with a physical camera. Faults can be injected to exercise the
//! failure paths of the session state machine.

use super::format_converters::encode_rgb_image;
use super::recording::{ActiveRecording, FrameSource};
use super::types::*;
use super::CameraBackend;
use crate::constants::{naming, simulated, timing};
use image::{Rgb, RgbImage};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// One-shot failures armed by tests or the CLI
#[derive(Debug, Default)]
struct Faults {
    open: Option<String>,
    photo: Option<String>,
    recording_start: Option<String>,
    recording_after: Option<(u32, String)>,
    stop: Option<String>,
}

#[derive(Default)]
struct SimulatedState {
    open: Option<CameraDevice>,
    recording: Option<ActiveRecording>,
    faults: Faults,
    frames_rendered: u32,
}

/// Camera backend that synthesizes frames
pub struct SimulatedBackend {
    devices: Vec<CameraDevice>,
    output_dir: PathBuf,
    photo_latency: Duration,
    frame_interval: Duration,
    state: Mutex<SimulatedState>,
}

impl SimulatedBackend {
    /// Backend with a back and a front camera writing into the temp directory
    pub fn new() -> Self {
        Self {
            devices: Self::default_devices(),
            output_dir: std::env::temp_dir().join(naming::TEMP_SUBDIR),
            photo_latency: timing::SIMULATED_PHOTO_LATENCY,
            frame_interval: timing::SIMULATED_FRAME_INTERVAL,
            state: Mutex::new(SimulatedState::default()),
        }
    }

    /// The devices a fresh backend exposes
    pub fn default_devices() -> Vec<CameraDevice> {
        vec![
            CameraDevice {
                name: "Simulated Back Camera".to_string(),
                path: "sim:0".to_string(),
                facing: Facing::Back,
                driver: Some("simulated".to_string()),
            },
            CameraDevice {
                name: "Simulated Front Camera".to_string(),
                path: "sim:1".to_string(),
                facing: Facing::Front,
                driver: Some("simulated".to_string()),
            },
        ]
    }

    pub fn with_devices(mut self, devices: Vec<CameraDevice>) -> Self {
        self.devices = devices;
        self
    }

    /// Directory receiving temporary capture files
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// How long a photo capture blocks
    pub fn with_photo_latency(mut self, latency: Duration) -> Self {
        self.photo_latency = latency;
        self
    }

    pub fn fail_next_open(&self, reason: impl Into<String>) {
        self.lock().faults.open = Some(reason.into());
    }

    pub fn fail_next_photo(&self, reason: impl Into<String>) {
        self.lock().faults.photo = Some(reason.into());
    }

    pub fn fail_next_recording_start(&self, reason: impl Into<String>) {
        self.lock().faults.recording_start = Some(reason.into());
    }

    /// Make the next recording fail after `frames` frames were written
    pub fn fail_next_recording_after(&self, frames: u32, reason: impl Into<String>) {
        self.lock().faults.recording_after = Some((frames, reason.into()));
    }

    pub fn fail_next_stop(&self, reason: impl Into<String>) {
        self.lock().faults.stop = Some(reason.into());
    }

    /// Device currently held open, if any
    pub fn open_device(&self) -> Option<CameraDevice> {
        self.lock().open.clone()
    }

    /// Whether a recording thread is still producing frames
    pub fn is_recording(&self) -> bool {
        self.lock()
            .recording
            .as_ref()
            .is_some_and(|r| !r.is_finished())
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn temp_path(&self, prefix: &str, extension: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.{}", prefix, uuid::Uuid::new_v4().simple(), extension))
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SimulatedBackend {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(recording) = state.recording.take() {
            recording.cancel();
        }
    }
}

/// Render the test pattern for frame number `frame`
///
/// Diagonal gradient with a bar that moves one step per frame.
pub fn render_test_pattern(width: u32, height: u32, frame: u32) -> RgbImage {
    let bar_width = (width / 8).max(1);
    let bar_x = frame.wrapping_mul(4) % width.max(1);

    RgbImage::from_fn(width, height, |x, y| {
        if x >= bar_x && x < bar_x + bar_width {
            return Rgb([255, 255, 255]);
        }
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        let b = (frame.wrapping_mul(7) % 256) as u8;
        Rgb([r, g, b])
    })
}

struct PatternSource {
    frame_interval: Duration,
    frame: u32,
    fail_after: Option<(u32, String)>,
}

impl FrameSource for PatternSource {
    fn next_frame(&mut self) -> Result<Vec<u8>, String> {
        std::thread::sleep(self.frame_interval);

        if let Some((limit, reason)) = &self.fail_after
            && self.frame >= *limit
        {
            return Err(reason.clone());
        }

        let image = render_test_pattern(simulated::FRAME_WIDTH, simulated::FRAME_HEIGHT, self.frame);
        self.frame += 1;
        encode_rgb_image(&image, simulated::VIDEO_JPEG_QUALITY)
    }
}

impl CameraBackend for SimulatedBackend {
    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::Simulated
    }

    fn is_available(&self) -> bool {
        true
    }

    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        self.devices.clone()
    }

    fn open(&self, device: &CameraDevice) -> BackendResult<()> {
        let mut state = self.lock();

        if let Some(reason) = state.faults.open.take() {
            warn!(device = %device.name, reason = %reason, "Injected open failure");
            return Err(BackendError::DeviceBusy(reason));
        }
        if !self.devices.iter().any(|d| d.path == device.path) {
            return Err(BackendError::DeviceNotFound(device.path.clone()));
        }

        if let Some(recording) = state.recording.take() {
            recording.cancel();
        }
        info!(device = %device.name, "Simulated camera opened");
        state.open = Some(device.clone());
        Ok(())
    }

    fn close(&self) {
        let mut state = self.lock();
        if let Some(recording) = state.recording.take() {
            recording.cancel();
        }
        if let Some(device) = state.open.take() {
            info!(device = %device.name, "Simulated camera closed");
        }
    }

    fn capture_photo(&self, options: &PhotoOptions) -> BackendResult<PathBuf> {
        let (device, fault, frame) = {
            let mut state = self.lock();
            let device = state.open.clone().ok_or(BackendError::NotOpen)?;
            let fault = state.faults.photo.take();
            state.frames_rendered = state.frames_rendered.wrapping_add(1);
            (device, fault, state.frames_rendered)
        };

        debug!(
            device = %device.name,
            quality = ?options.quality,
            flash = ?options.flash,
            red_eye_reduction = options.red_eye_reduction,
            "Simulated photo capture"
        );
        std::thread::sleep(self.photo_latency);

        if let Some(reason) = fault {
            return Err(BackendError::CaptureFailed(reason));
        }
        if self.lock().open.as_ref() != Some(&device) {
            return Err(BackendError::CaptureFailed(
                "Device was closed during capture".to_string(),
            ));
        }

        let image = render_test_pattern(simulated::PHOTO_WIDTH, simulated::PHOTO_HEIGHT, frame);
        let jpeg = encode_rgb_image(&image, options.quality.jpeg_quality())
            .map_err(BackendError::CaptureFailed)?;

        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.temp_path(naming::PHOTO_PREFIX, naming::PHOTO_EXTENSION);
        std::fs::write(&path, jpeg)?;

        Ok(path)
    }

    fn start_recording(
        &self,
        options: &RecordingOptions,
        completion: RecordingCompletionSender,
    ) -> BackendResult<()> {
        let mut state = self.lock();

        let device = state.open.clone().ok_or(BackendError::NotOpen)?;
        if state.recording.as_ref().is_some_and(|r| !r.is_finished()) {
            return Err(BackendError::RecordingInProgress);
        }
        if let Some(reason) = state.faults.recording_start.take() {
            return Err(BackendError::CaptureFailed(reason));
        }

        if options.audio {
            debug!("Simulated recording includes a silent audio track");
        }

        let path = self.temp_path(naming::VIDEO_PREFIX, naming::VIDEO_EXTENSION);
        let source = PatternSource {
            frame_interval: self.frame_interval,
            frame: 0,
            fail_after: state.faults.recording_after.take(),
        };

        info!(device = %device.name, path = %path.display(), "Simulated recording started");
        state.recording = Some(ActiveRecording::spawn(
            "sim-recording",
            path,
            options.max_duration,
            completion,
            move || Ok(source),
        ));
        Ok(())
    }

    fn stop_recording(&self) -> BackendResult<()> {
        let mut guard = self.lock();
        let state = &mut *guard;

        match state.recording.as_ref() {
            Some(recording) if !recording.is_finished() => {
                if let Some(reason) = state.faults.stop.take() {
                    return Err(BackendError::Other(reason));
                }
                recording.request_stop();
                Ok(())
            }
            _ => Err(BackendError::NoRecordingInProgress),
        }
    }

    fn cancel_recording(&self) {
        if let Some(recording) = self.lock().recording.take() {
            debug!("Cancelling simulated recording");
            recording.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(dir: &std::path::Path) -> SimulatedBackend {
        SimulatedBackend::new()
            .with_output_dir(dir)
            .with_photo_latency(Duration::from_millis(1))
    }

    #[test]
    fn test_photo_requires_open_device() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());
        assert_eq!(
            backend.capture_photo(&PhotoOptions::default()),
            Err(BackendError::NotOpen)
        );
    }

    #[test]
    fn test_photo_is_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());
        let device = backend.enumerate_cameras()[0].clone();
        backend.open(&device).unwrap();

        let path = backend.capture_photo(&PhotoOptions::default()).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(super::super::format_converters::is_jpeg(&bytes));
        assert!(path.starts_with(dir.path()));
    }

    #[test]
    fn test_injected_photo_fault_is_one_shot() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());
        let device = backend.enumerate_cameras()[0].clone();
        backend.open(&device).unwrap();

        backend.fail_next_photo("lens cap");
        assert_eq!(
            backend.capture_photo(&PhotoOptions::default()),
            Err(BackendError::CaptureFailed("lens cap".to_string()))
        );
        assert!(backend.capture_photo(&PhotoOptions::default()).is_ok());
    }

    #[test]
    fn test_unknown_device_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());
        let stranger = CameraDevice {
            name: "Elsewhere".to_string(),
            path: "sim:9".to_string(),
            facing: Facing::Back,
            driver: None,
        };
        assert!(matches!(
            backend.open(&stranger),
            Err(BackendError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_recording_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());
        let device = backend.enumerate_cameras()[0].clone();
        backend.open(&device).unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel();
        backend
            .start_recording(&RecordingOptions::default(), tx)
            .unwrap();
        assert!(backend.is_recording());

        let (tx2, _rx2) = tokio::sync::oneshot::channel();
        assert_eq!(
            backend.start_recording(&RecordingOptions::default(), tx2),
            Err(BackendError::RecordingInProgress)
        );

        std::thread::sleep(Duration::from_millis(80));
        backend.stop_recording().unwrap();

        let path = rx.blocking_recv().unwrap().unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
        assert_eq!(
            backend.stop_recording(),
            Err(BackendError::NoRecordingInProgress)
        );
    }

    #[test]
    fn test_close_releases_device() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());
        let device = backend.enumerate_cameras()[1].clone();
        backend.open(&device).unwrap();
        assert_eq!(backend.open_device(), Some(device));

        backend.close();
        assert_eq!(backend.open_device(), None);
    }

    #[test]
    fn test_pattern_moves_between_frames() {
        let a = render_test_pattern(32, 16, 0);
        let b = render_test_pattern(32, 16, 3);
        assert_ne!(a, b);
        assert_eq!(a.dimensions(), (32, 16));
    }

    #[test]
    fn test_injected_stop_fault_keeps_recording() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());
        let device = backend.enumerate_cameras()[0].clone();
        backend.open(&device).unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel();
        backend
            .start_recording(&RecordingOptions::default(), tx)
            .unwrap();

        backend.fail_next_stop("encoder wedged");
        assert_eq!(
            backend.stop_recording(),
            Err(BackendError::Other("encoder wedged".to_string()))
        );
        assert!(backend.is_recording());

        std::thread::sleep(Duration::from_millis(80));
        backend.stop_recording().unwrap();
        assert!(rx.blocking_recv().unwrap().is_ok());
    }

    #[test]
    fn test_pattern_survives_huge_frame_numbers() {
        let image = render_test_pattern(32, 16, u32::MAX);
        assert_eq!(image.dimensions(), (32, 16));
    }
}
