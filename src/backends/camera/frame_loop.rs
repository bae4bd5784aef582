// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for recording loops
//!
//! Recording backends write frames on a dedicated thread until they are told
//! to stop. This module owns that thread: it runs an init step, iterates the
//! loop body, and always hands the loop state to an exit step so the clip can
//! be finalized (or discarded) exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Action returned by the loop body to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Why a loop ended, passed to the exit step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The controller's stop signal was raised
    Requested,
    /// The loop body returned [`LoopAction::Stop`]
    Finished,
}

/// Body of the loop thread: init, iterate, then always run the exit step
fn run_loop<S, I, F, E>(name: &str, stop: &AtomicBool, init_fn: I, mut loop_fn: F, exit_fn: E)
where
    I: FnOnce() -> Result<S, String>,
    F: FnMut(&mut S) -> LoopAction,
    E: FnOnce(Result<S, String>, LoopExit),
{
    let mut state = match init_fn() {
        Ok(state) => state,
        Err(e) => {
            warn!(name, error = %e, "Capture loop could not initialize");
            return exit_fn(Err(e), LoopExit::Finished);
        }
    };

    let exit = loop {
        if stop.load(Ordering::SeqCst) {
            break LoopExit::Requested;
        }
        if loop_fn(&mut state) == LoopAction::Stop {
            break LoopExit::Finished;
        }
    };

    debug!(name, ?exit, "Capture loop ended");
    exit_fn(Ok(state), exit);
}

/// Handle to a loop running on its own named thread
///
/// ```ignore
/// let controller = CaptureLoopController::start_with_init(
///     "recording",
///     || open_output(),
///     |out| { out.write_frame(); LoopAction::Continue },
///     |result, exit| finalize(result, exit),
/// );
/// controller.request_stop();
/// ```
///
/// Dropping the controller stops the loop and joins the thread; use
/// [`detach`](Self::detach) where blocking is not allowed.
pub struct CaptureLoopController {
    name: String,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureLoopController {
    /// Spawn the loop thread
    ///
    /// `init_fn` runs once on the new thread. On failure the loop body never
    /// runs and `exit_fn` receives the error. Otherwise `loop_fn` runs until
    /// it returns [`LoopAction::Stop`] or a stop is requested, and `exit_fn`
    /// receives the final state.
    pub fn start_with_init<S, I, F, E>(name: &str, init_fn: I, loop_fn: F, exit_fn: E) -> Self
    where
        S: 'static,
        I: FnOnce() -> Result<S, String> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
        E: FnOnce(Result<S, String>, LoopExit) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread_name = name.to_string();

        let spawned = thread::Builder::new().name(name.to_string()).spawn(move || {
            run_loop(&thread_name, &thread_stop, init_fn, loop_fn, exit_fn);
        });

        // A failed spawn drops exit_fn with the closure, which callers see as
        // a dropped completion sender.
        let thread = match spawned {
            Ok(handle) => {
                info!(name, "Capture loop started");
                Some(handle)
            }
            Err(e) => {
                warn!(name, error = %e, "Failed to spawn capture loop thread");
                None
            }
        };

        Self {
            name: name.to_string(),
            stop,
            thread,
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop to stop without waiting
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Capture loop stop requested");
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Signal the loop and wait for its thread
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Signal the loop and let the thread wind down on its own
    pub fn detach(mut self) {
        self.request_stop();
        self.thread = None;
    }

    /// Wait for the thread without signalling it
    pub fn join(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };
        if handle.join().is_err() {
            warn!(name = %self.name, "Capture loop thread panicked");
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
        }
    }
}
