// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Resolving permissions
//! - Taking photos
//! - Recording videos
//! - Inspecting the gallery and configuration
//!
//! Every capture goes through a [`CaptureSessionManager`], the same way a
//! graphical shell would drive it.

use crate::SessionArgs;
use camera_session::backends::camera::{
    CameraBackend, CameraBackendType, CameraDevice, Facing, FlashMode, QualityPrioritization,
    RecordingOptions, SimulatedBackend, get_backend_for_type,
};
use camera_session::backends::permissions::{
    Capability, DeviceAccessPermissions, FixedPermissions, PermissionProvider, PermissionState,
};
use camera_session::config::Config;
use camera_session::constants::{app_info, format_duration, timing};
use camera_session::errors::SessionError;
use camera_session::session::{CaptureResult, CaptureSessionManager, DeviceHandle};
use camera_session::storage::{GallerySink, MediaKind, archive, latest_capture};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn backend_type(args: &SessionArgs, config: &Config) -> CameraBackendType {
    args.backend.unwrap_or(config.backend)
}

fn build_collaborators(
    args: &SessionArgs,
    config: &Config,
) -> (Arc<dyn CameraBackend>, Arc<dyn PermissionProvider>) {
    match backend_type(args, config) {
        CameraBackendType::Simulated => {
            let permissions = args.deny.iter().fold(FixedPermissions::new(), |p, &capability| {
                p.with_prompt_answer(capability, PermissionState::Denied)
            });
            (Arc::new(SimulatedBackend::new()), Arc::new(permissions))
        }
        backend => {
            if !args.deny.is_empty() {
                warn!("--deny only applies to the simulated backend");
            }
            (
                get_backend_for_type(backend),
                Arc::new(DeviceAccessPermissions::new()),
            )
        }
    }
}

/// Create a session and log every snapshot it publishes
fn start_session(args: &SessionArgs, config: &Config) -> CaptureSessionManager {
    let (backend, permissions) = build_collaborators(args, config);
    info!(backend = %backend.backend_type(), "Starting capture session");

    let session = CaptureSessionManager::new(backend, permissions);
    let mut snapshots = session.subscribe();
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            debug!(
                state = %snapshot.state,
                camera = %snapshot.permissions.camera,
                microphone = %snapshot.permissions.microphone,
                device = ?snapshot.device_name,
                "Session changed"
            );
        }
    });
    session
}

/// Facings to try when none was requested
///
/// The last used camera's facing comes first if that camera is still
/// present, then the configured default, then the rest.
fn facing_order(config: &Config, devices: &[CameraDevice]) -> Vec<Facing> {
    let remembered = config
        .last_camera_path
        .as_deref()
        .and_then(|path| devices.iter().find(|d| d.path == path))
        .map(|d| d.facing);

    let mut order: Vec<Facing> = remembered.into_iter().collect();
    for facing in std::iter::once(config.default_facing).chain(Facing::ALL) {
        if !order.contains(&facing) {
            order.push(facing);
        }
    }
    order
}

/// Bind the requested facing, or the remembered/configured one with fallbacks
fn bind(session: &CaptureSessionManager, args: &SessionArgs, config: &Config) -> Result<DeviceHandle, SessionError> {
    let handle = match args.facing {
        Some(facing) => session.bind_device(facing)?,
        None => {
            let order = facing_order(config, &session.available_devices());
            debug!(?order, "Choosing a camera");

            let mut last_error = SessionError::NoDeviceFound(config.default_facing);
            let mut bound = None;
            for facing in order {
                match session.bind_device(facing) {
                    Ok(handle) => {
                        bound = Some(handle);
                        break;
                    }
                    Err(e @ SessionError::NoDeviceFound(_)) => last_error = e,
                    Err(e) => return Err(e),
                }
            }
            bound.ok_or(last_error)?
        }
    };

    println!("Using camera: {} ({})", handle.device().name, handle.facing());

    if config.last_camera_path.as_deref() != Some(handle.device().path.as_str())
        && let Err(e) = Config::remember_camera(&handle.device().path)
    {
        warn!(error = %e, "Failed to remember the camera");
    }
    Ok(handle)
}

/// Ask for permissions and fail early on the ones a command needs
async fn require(session: &CaptureSessionManager, needed: &[Capability]) -> Result<(), SessionError> {
    let permissions = session.request_permissions().await;
    for &capability in needed {
        if !permissions.get(capability).is_granted() {
            return Err(SessionError::PermissionDenied(capability));
        }
    }
    Ok(())
}

/// List all available cameras
pub fn list_cameras(args: &SessionArgs) -> CliResult {
    let config = Config::load();
    let (backend, _) = build_collaborators(args, &config);

    if !backend.is_available() {
        println!("The {} backend is not available on this system.", backend.backend_type());
        return Ok(());
    }

    let cameras = backend.enumerate_cameras();
    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras ({}):", backend.backend_type());
    println!();
    for (index, camera) in cameras.iter().enumerate() {
        println!("  [{}] {}", index, camera.name);
        println!("      Facing: {}", camera.facing);
        println!("      Path:   {}", camera.path);
        if let Some(driver) = &camera.driver {
            println!("      Driver: {}", driver);
        }
        println!();
    }

    Ok(())
}

/// Resolve and print camera and microphone permissions
pub fn show_permissions(args: &SessionArgs) -> CliResult {
    let config = Config::load();
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let session = start_session(args, &config);
        let permissions = session.request_permissions().await;
        for capability in Capability::ALL {
            println!("{:<11} {}", format!("{}:", capability), permissions.get(capability));
        }
    });
    Ok(())
}

/// Take a photo and move it into the gallery
pub fn take_photo(
    args: &SessionArgs,
    quality: Option<QualityPrioritization>,
    flash: Option<FlashMode>,
    no_red_eye_reduction: bool,
) -> CliResult {
    let config = Config::load();
    let mut options = config.photo;
    if let Some(quality) = quality {
        options.quality = quality;
    }
    if let Some(flash) = flash {
        options.flash = flash;
    }
    if no_red_eye_reduction {
        options.red_eye_reduction = false;
    }

    let sink = GallerySink::for_folder(&config.save_folder)?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let session = start_session(args, &config);
        require(&session, &[Capability::Camera]).await?;
        bind(&session, args, &config)?;

        println!("Capturing...");
        let result = session.take_photo(options).await?;
        session.teardown();

        if let CaptureResult::Failed { reason } = &result {
            return Err(format!("Photo capture failed: {}", reason).into());
        }
        let saved = archive(&sink, result).await?;
        println!("Photo saved: {}", saved.display());
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Configured recording options with this run's overrides applied
fn recording_options(config: &Config, duration: Option<u64>, no_audio: bool) -> RecordingOptions {
    let mut options = config.recording_options();
    if let Some(secs) = duration {
        options.max_duration = Some(Duration::from_secs(secs));
    }
    if no_audio {
        options.audio = false;
    }
    options
}

/// Record a video until the duration elapses or Ctrl+C is pressed
pub fn record_video(args: &SessionArgs, duration: Option<u64>, no_audio: bool) -> CliResult {
    let config = Config::load();
    let options = recording_options(&config, duration, no_audio);

    let sink = GallerySink::for_folder(&config.save_folder)?;

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = Arc::clone(&stop_flag);
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let session = start_session(args, &config);
        let needed: &[Capability] = if options.audio {
            &Capability::ALL
        } else {
            &[Capability::Camera]
        };
        require(&session, needed).await?;
        bind(&session, args, &config)?;

        let mut completion = session.start_recording(options)?;

        println!();
        match options.max_duration {
            Some(limit) => println!(
                "Recording for {}... (press Ctrl+C to stop early)",
                format_duration(limit)
            ),
            None => println!("Recording... (press Ctrl+C to stop)"),
        }
        if options.audio {
            println!("Audio: enabled");
        }

        let start = Instant::now();
        let result = loop {
            tokio::select! {
                result = &mut completion => break result,
                _ = tokio::time::sleep(timing::RECORDING_PROGRESS_INTERVAL) => {}
            }

            if stop_flag.swap(false, Ordering::SeqCst) {
                println!();
                println!("Stopping...");
                session.stop_recording()?;
            }

            print!("\rRecording: {}", format_duration(start.elapsed()));
            std::io::stdout().flush()?;
        };
        println!();
        session.teardown();

        if let CaptureResult::Failed { reason } = &result {
            return Err(format!("Recording failed: {}", reason).into());
        }
        let saved = archive(&sink, result).await?;
        println!("Video saved: {}", saved.display());
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Show the newest photo and video in the gallery
pub fn show_gallery() -> CliResult {
    let config = Config::load();
    let sink = GallerySink::for_folder(&config.save_folder)?;
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        for kind in [MediaKind::Photo, MediaKind::Video] {
            let dir = sink.dir_for(kind).to_path_buf();
            let label = match kind {
                MediaKind::Photo => "Latest photo",
                MediaKind::Video => "Latest video",
            };
            match latest_capture(dir.clone()).await {
                Some(latest) => {
                    let taken = chrono::DateTime::<chrono::Local>::from(latest.modified)
                        .format("%Y-%m-%d %H:%M:%S");
                    match latest.dimensions {
                        Some((w, h)) => {
                            println!("{}: {} ({}x{}, {})", label, latest.path.display(), w, h, taken)
                        }
                        None => println!("{}: {} ({})", label, latest.path.display(), taken),
                    }
                }
                None => println!("{}: none in {}", label, dir.display()),
            }
        }
    });
    Ok(())
}

/// Print the configuration, optionally writing it to disk
pub fn show_config(save: bool) -> CliResult {
    let config = Config::load();

    println!(
        "camera-session {} ({})",
        app_info::version(),
        app_info::runtime_environment()
    );
    match Config::path() {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: unavailable"),
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);

    if save {
        let path = config.save()?;
        println!();
        println!("Saved to {}", path.display());
    }
    Ok(())
}
