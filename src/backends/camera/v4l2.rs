// SPDX-License-Identifier: GPL-3.0-only

//! Direct V4L2 capture backend
//!
//! Talks to `/dev/video*` nodes through the v4l crate. The device is opened
//! (and its format negotiated) when the session binds it, and the open file
//! descriptor is held until the session closes it. Photos and recordings
//! each run their own mmap stream on that descriptor.
//!
//! MJPG is preferred since frames arrive already encoded; YUYV is the
//! fallback and gets converted and encoded in software.

use super::format_converters::{encode_jpeg, is_jpeg, yuyv_to_rgb};
use super::recording::{ActiveRecording, FrameSource};
use super::types::*;
use super::CameraBackend;
use crate::constants::{naming, v4l2 as v4l2_consts};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::{Format, FourCC};

/// Negotiated stream format of an open device
#[derive(Debug, Clone, Copy)]
struct StreamFormat {
    width: u32,
    height: u32,
    fourcc: FourCC,
}

impl StreamFormat {
    fn is_mjpeg(&self) -> bool {
        self.fourcc == FourCC::new(v4l2_consts::FOURCC_MJPG)
    }

    /// Turn one raw buffer into a JPEG
    fn to_jpeg(&self, buf: &[u8], quality: u8) -> Result<Vec<u8>, String> {
        if self.is_mjpeg() {
            if !is_jpeg(buf) {
                return Err("Device returned a corrupt MJPG frame".to_string());
            }
            return Ok(buf.to_vec());
        }
        let rgb = yuyv_to_rgb(buf, self.width, self.height);
        encode_jpeg(&rgb, self.width, self.height, quality)
    }
}

struct OpenCamera {
    device: CameraDevice,
    handle: Arc<Device>,
    format: StreamFormat,
}

#[derive(Default)]
struct V4l2State {
    open: Option<OpenCamera>,
    recording: Option<ActiveRecording>,
}

/// V4L2 camera backend
pub struct V4l2Backend {
    dev_dir: PathBuf,
    output_dir: PathBuf,
    state: Mutex<V4l2State>,
}

impl V4l2Backend {
    pub fn new() -> Self {
        Self {
            dev_dir: PathBuf::from(v4l2_consts::DEV_DIR),
            output_dir: std::env::temp_dir().join(naming::TEMP_SUBDIR),
            state: Mutex::new(V4l2State::default()),
        }
    }

    /// Directory scanned for capture nodes
    pub fn with_dev_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dev_dir = dir.into();
        self
    }

    /// Directory receiving temporary capture files
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    fn lock(&self) -> MutexGuard<'_, V4l2State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn temp_path(&self, prefix: &str, extension: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.{}", prefix, uuid::Uuid::new_v4().simple(), extension))
    }

    /// Capture node paths in `dev_dir`, sorted
    fn video_nodes(&self) -> Vec<PathBuf> {
        let mut nodes: Vec<PathBuf> = std::fs::read_dir(&self.dev_dir)
            .into_iter()
            .flatten()
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(v4l2_consts::NODE_PREFIX))
            })
            .collect();
        nodes.sort();
        nodes
    }

    /// Probe a node, returning `None` for metadata and output-only nodes
    fn probe(path: &Path) -> Option<CameraDevice> {
        let dev = Device::with_path(path).ok()?;
        let caps = dev.query_caps().ok()?;

        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            debug!(path = %path.display(), "Skipping node without video capture");
            return None;
        }
        if dev.enum_formats().map(|f| f.is_empty()).unwrap_or(true) {
            debug!(path = %path.display(), "Skipping node without capture formats");
            return None;
        }

        Some(CameraDevice {
            facing: facing_for_card(&caps.card),
            name: caps.card,
            path: path.to_string_lossy().to_string(),
            driver: Some(caps.driver),
        })
    }
}

impl Default for V4l2Backend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for V4l2Backend {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(recording) = state.recording.take() {
            recording.cancel();
        }
    }
}

/// Guess the mounting position from the V4L2 card name
///
/// Built-in laptop cameras face the user; anything without a hint is treated
/// as external.
fn facing_for_card(card: &str) -> Facing {
    if card.to_ascii_lowercase().contains("integrated") {
        return Facing::Front;
    }
    Facing::from_location_hint(card).unwrap_or(Facing::External)
}

/// Set MJPG at the preferred size, falling back to YUYV
fn negotiate_format(dev: &Device) -> BackendResult<StreamFormat> {
    let mut last_error = None;

    for fourcc in [v4l2_consts::FOURCC_MJPG, v4l2_consts::FOURCC_YUYV] {
        let wanted = Format::new(
            v4l2_consts::PREFERRED_WIDTH,
            v4l2_consts::PREFERRED_HEIGHT,
            FourCC::new(fourcc),
        );
        match dev.set_format(&wanted) {
            Ok(actual) if actual.fourcc == wanted.fourcc => {
                return Ok(StreamFormat {
                    width: actual.width,
                    height: actual.height,
                    fourcc: actual.fourcc,
                });
            }
            Ok(actual) => {
                debug!(wanted = ?wanted.fourcc, got = ?actual.fourcc, "Format not accepted");
            }
            Err(e) => {
                debug!(wanted = ?wanted.fourcc, error = %e, "Failed to set format");
                last_error = Some(e);
            }
        }
    }

    Err(match last_error {
        Some(e) => BackendError::from(e),
        None => BackendError::NotAvailable("Device supports neither MJPG nor YUYV".to_string()),
    })
}

/// Read the next frame from a stream as JPEG
fn next_jpeg(stream: &mut MmapStream<'static>, format: StreamFormat, quality: u8) -> Result<Vec<u8>, String> {
    let (buf, meta) = stream
        .next()
        .map_err(|e| format!("Failed to dequeue frame: {}", e))?;
    let used = (meta.bytesused as usize).min(buf.len());
    let used = if used == 0 { buf.len() } else { used };
    format.to_jpeg(&buf[..used], quality)
}

/// Recording frame source backed by an mmap stream
struct V4l2FrameSource {
    stream: MmapStream<'static>,
    format: StreamFormat,
    // Keeps the descriptor alive for as long as the stream runs
    _handle: Arc<Device>,
}

impl FrameSource for V4l2FrameSource {
    fn next_frame(&mut self) -> Result<Vec<u8>, String> {
        next_jpeg(&mut self.stream, self.format, v4l2_consts::VIDEO_JPEG_QUALITY)
    }
}

impl CameraBackend for V4l2Backend {
    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::V4l2
    }

    fn is_available(&self) -> bool {
        !self.video_nodes().is_empty()
    }

    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        let cameras: Vec<CameraDevice> = self
            .video_nodes()
            .iter()
            .filter_map(|path| Self::probe(path))
            .collect();

        info!(count = cameras.len(), "Enumerated V4L2 cameras");
        cameras
    }

    fn open(&self, device: &CameraDevice) -> BackendResult<()> {
        let dev = Device::with_path(&device.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BackendError::DeviceNotFound(device.path.clone()),
            _ => BackendError::from(e),
        })?;
        let format = negotiate_format(&dev)?;

        info!(
            device = %device.name,
            path = %device.path,
            width = format.width,
            height = format.height,
            fourcc = ?format.fourcc,
            "V4L2 camera opened"
        );

        let mut state = self.lock();
        if let Some(recording) = state.recording.take() {
            recording.cancel();
        }
        state.open = Some(OpenCamera {
            device: device.clone(),
            handle: Arc::new(dev),
            format,
        });
        Ok(())
    }

    fn close(&self) {
        let mut state = self.lock();
        if let Some(recording) = state.recording.take() {
            recording.cancel();
        }
        if let Some(open) = state.open.take() {
            info!(device = %open.device.name, "V4L2 camera closed");
        }
    }

    fn capture_photo(&self, options: &PhotoOptions) -> BackendResult<PathBuf> {
        let (handle, format) = {
            let state = self.lock();
            let open = state.open.as_ref().ok_or(BackendError::NotOpen)?;
            (Arc::clone(&open.handle), open.format)
        };

        if options.flash != FlashMode::Off {
            debug!(flash = ?options.flash, "V4L2 devices have no flash control, ignoring");
        }

        let mut stream = MmapStream::with_buffers(&handle, Type::VideoCapture, v4l2_consts::STREAM_BUFFERS)
            .map_err(BackendError::from)?;

        let warmup = options.quality.warmup_frames();
        for _ in 0..warmup {
            stream
                .next()
                .map_err(|e| BackendError::CaptureFailed(format!("Warmup frame failed: {}", e)))?;
        }
        let jpeg = next_jpeg(&mut stream, format, options.quality.jpeg_quality())
            .map_err(BackendError::CaptureFailed)?;
        drop(stream);

        let still_open = self
            .lock()
            .open
            .as_ref()
            .is_some_and(|open| Arc::ptr_eq(&open.handle, &handle));
        if !still_open {
            return Err(BackendError::CaptureFailed(
                "Device was closed during capture".to_string(),
            ));
        }

        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.temp_path(naming::PHOTO_PREFIX, naming::PHOTO_EXTENSION);
        std::fs::write(&path, &jpeg)?;

        debug!(path = %path.display(), bytes = jpeg.len(), warmup, "V4L2 photo captured");
        Ok(path)
    }

    fn start_recording(
        &self,
        options: &RecordingOptions,
        completion: RecordingCompletionSender,
    ) -> BackendResult<()> {
        let mut state = self.lock();

        let open = state.open.as_ref().ok_or(BackendError::NotOpen)?;
        let handle = Arc::clone(&open.handle);
        let format = open.format;
        let name = open.device.name.clone();

        if state.recording.as_ref().is_some_and(|r| !r.is_finished()) {
            return Err(BackendError::RecordingInProgress);
        }
        if options.audio {
            warn!("V4L2 backend records video only, audio track will be missing");
        }

        let path = self.temp_path(naming::VIDEO_PREFIX, naming::VIDEO_EXTENSION);
        info!(device = %name, path = %path.display(), "V4L2 recording started");

        state.recording = Some(ActiveRecording::spawn(
            "v4l2-recording",
            path,
            options.max_duration,
            completion,
            move || {
                let stream =
                    MmapStream::with_buffers(&handle, Type::VideoCapture, v4l2_consts::STREAM_BUFFERS)
                        .map_err(|e| format!("Failed to create buffer stream: {}", e))?;
                Ok(V4l2FrameSource {
                    stream,
                    format,
                    _handle: handle,
                })
            },
        ));
        Ok(())
    }

    fn stop_recording(&self) -> BackendResult<()> {
        match self.lock().recording.as_ref() {
            Some(recording) if !recording.is_finished() => {
                recording.request_stop();
                Ok(())
            }
            _ => Err(BackendError::NoRecordingInProgress),
        }
    }

    fn cancel_recording(&self) {
        if let Some(recording) = self.lock().recording.take() {
            debug!("Cancelling V4L2 recording");
            recording.cancel();
        }
    }
}
