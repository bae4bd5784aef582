// SPDX-License-Identifier: GPL-3.0-only

//! Recording plumbing shared by capture backends
//!
//! A backend supplies a [`FrameSource`] that yields encoded JPEG frames; this
//! module runs it on a [`CaptureLoopController`] thread, appends the frames
//! to an MJPEG file and reports the outcome on the one-shot completion
//! channel exactly once.

use super::frame_loop::{CaptureLoopController, LoopAction};
use super::types::{BackendError, RecordingCompletionSender, RecordingOutcome};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Produces encoded frames for a recording
pub trait FrameSource: 'static {
    /// Block until the next JPEG frame is available
    fn next_frame(&mut self) -> Result<Vec<u8>, String>;
}

/// MJPEG output file being written by a recording loop
struct RecordingWriter {
    file: BufWriter<File>,
    path: PathBuf,
    frames: u64,
    started: Instant,
    max_duration: Option<Duration>,
    error: Option<String>,
}

impl RecordingWriter {
    fn create(path: PathBuf, max_duration: Option<Duration>) -> Result<Self, String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
        }
        let file = File::create(&path)
            .map_err(|e| format!("Failed to create {}: {}", path.display(), e))?;

        Ok(Self {
            file: BufWriter::new(file),
            path,
            frames: 0,
            started: Instant::now(),
            max_duration,
            error: None,
        })
    }

    fn write_frame(&mut self, frame: &[u8]) -> LoopAction {
        if let Err(e) = self.file.write_all(frame) {
            self.error = Some(format!("Failed to write frame: {}", e));
            return LoopAction::Stop;
        }
        self.frames += 1;

        match self.max_duration {
            Some(limit) if self.started.elapsed() >= limit => {
                info!(frames = self.frames, "Maximum recording duration reached");
                LoopAction::Stop
            }
            _ => LoopAction::Continue,
        }
    }

    fn discard(self) {
        let path = self.path.clone();
        drop(self.file);
        if let Err(e) = std::fs::remove_file(&path) {
            debug!(path = %path.display(), error = %e, "Could not remove discarded recording");
        }
    }

    fn finish(mut self) -> RecordingOutcome {
        if let Some(error) = self.error.take() {
            self.discard();
            return Err(BackendError::CaptureFailed(error));
        }
        if self.frames == 0 {
            self.discard();
            return Err(BackendError::CaptureFailed(
                "Recording ended before any frame was captured".to_string(),
            ));
        }
        if let Err(e) = self.file.flush() {
            let reason = format!("Failed to flush recording: {}", e);
            self.discard();
            return Err(BackendError::IoError(reason));
        }

        info!(
            path = %self.path.display(),
            frames = self.frames,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Recording finalized"
        );
        Ok(self.path)
    }
}

struct RecordingLoop<S> {
    source: S,
    writer: RecordingWriter,
}

/// A recording running on its own thread
pub struct ActiveRecording {
    controller: CaptureLoopController,
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl ActiveRecording {
    /// Start recording frames from the source produced by `open_source`
    ///
    /// `open_source` runs on the recording thread so slow device setup never
    /// blocks the caller.
    pub fn spawn<S, I>(
        name: &str,
        path: PathBuf,
        max_duration: Option<Duration>,
        completion: RecordingCompletionSender,
        open_source: I,
    ) -> Self
    where
        S: FrameSource,
        I: FnOnce() -> Result<S, String> + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let cancelled_clone = Arc::clone(&cancelled);
        let finished_clone = Arc::clone(&finished);

        let controller = CaptureLoopController::start_with_init(
            name,
            move || {
                let source = open_source()?;
                let writer = RecordingWriter::create(path, max_duration)?;
                Ok(RecordingLoop { source, writer })
            },
            |rec: &mut RecordingLoop<S>| match rec.source.next_frame() {
                Ok(frame) => rec.writer.write_frame(&frame),
                Err(e) => {
                    warn!(error = %e, "Frame source failed during recording");
                    rec.writer.error = Some(e);
                    LoopAction::Stop
                }
            },
            move |state, exit| {
                let outcome = match state {
                    Err(e) => Err(BackendError::CaptureFailed(e)),
                    Ok(rec) if cancelled_clone.load(Ordering::SeqCst) => {
                        rec.writer.discard();
                        Err(BackendError::Cancelled)
                    }
                    Ok(rec) => rec.writer.finish(),
                };

                debug!(?exit, ok = outcome.is_ok(), "Recording loop ended");
                finished_clone.store(true, Ordering::SeqCst);

                if completion.send(outcome).is_err() {
                    debug!("Recording completion receiver was dropped");
                }
            },
        );

        Self {
            controller,
            cancelled,
            finished,
        }
    }

    /// Whether the completion has been reported
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Ask the loop to finalize the clip (non-blocking)
    pub fn request_stop(&self) {
        self.controller.request_stop();
    }

    /// Discard the clip and let the thread exit on its own
    pub fn cancel(self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.controller.detach();
    }
}
