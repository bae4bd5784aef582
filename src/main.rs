// SPDX-License-Identifier: GPL-3.0-only

use camera_session::backends::camera::{CameraBackendType, Facing, FlashMode, QualityPrioritization};
use camera_session::backends::permissions::Capability;
use camera_session::constants::app_info;
use clap::{Args, Parser, Subcommand};

mod cli;

#[derive(Parser)]
#[command(name = "camera-session")]
#[command(about = "Capture photos and videos through a serialized camera session")]
#[command(version = app_info::version())]
struct Cli {
    #[command(flatten)]
    session: SessionArgs,

    /// Log at info level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that opens a session
#[derive(Args, Debug, Clone, Default)]
pub struct SessionArgs {
    /// Camera backend (simulated or v4l2); defaults to the configured one
    #[arg(long, global = true)]
    pub backend: Option<CameraBackendType>,

    /// Shortcut for --backend simulated
    #[arg(long, global = true, conflicts_with = "backend")]
    pub simulated: bool,

    /// Camera facing to bind (front, back or external)
    #[arg(short, long, global = true)]
    pub facing: Option<Facing>,

    /// Deny a capability when prompted (simulated backend only)
    #[arg(long, global = true, value_name = "CAPABILITY")]
    pub deny: Vec<Capability>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List,

    /// Request camera and microphone permissions and show the result
    Permissions,

    /// Take a photo and save it to the gallery
    Photo {
        /// Speed, balanced or quality
        #[arg(short, long)]
        quality: Option<QualityPrioritization>,

        /// Flash mode (off, on or auto)
        #[arg(long)]
        flash: Option<FlashMode>,

        /// Disable automatic red-eye reduction
        #[arg(long)]
        no_red_eye_reduction: bool,
    },

    /// Record a video and save it to the gallery
    Video {
        /// Stop after this many seconds (default: until Ctrl+C)
        #[arg(short, long)]
        duration: Option<u64>,

        /// Record without the microphone
        #[arg(long)]
        no_audio: bool,
    },

    /// Show the most recent captures
    Gallery,

    /// Show the configuration
    Config {
        /// Write the effective configuration to disk
        #[arg(long)]
        save: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_session=debug, RUST_LOG=info
    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let mut args = cli.session;
    if args.simulated {
        args.backend = Some(CameraBackendType::Simulated);
    }

    match cli.command {
        Commands::List => cli::list_cameras(&args),
        Commands::Permissions => cli::show_permissions(&args),
        Commands::Photo {
            quality,
            flash,
            no_red_eye_reduction,
        } => cli::take_photo(&args, quality, flash, no_red_eye_reduction),
        Commands::Video { duration, no_audio } => cli::record_video(&args, duration, no_audio),
        Commands::Gallery => cli::show_gallery(),
        Commands::Config { save } => cli::show_config(save),
    }
}
