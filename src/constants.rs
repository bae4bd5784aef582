// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Application identifier, also the config and temp directory name
pub const APP_ID: &str = "camera-session";

/// Default folder name for saved captures (inside the user's Pictures directory)
pub const DEFAULT_SAVE_FOLDER: &str = "Camera";

/// Format a recording duration for display (e.g., "01:05" or "1:02:03")
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// Capture file naming
pub mod naming {
    /// Prefix of saved and temporary photo files
    pub const PHOTO_PREFIX: &str = "photo";

    /// Prefix of saved and temporary video files
    pub const VIDEO_PREFIX: &str = "video";

    /// Extension written by every backend for photos
    pub const PHOTO_EXTENSION: &str = "jpg";

    /// Extension written by every backend for recordings (concatenated JPEG frames)
    pub const VIDEO_EXTENSION: &str = "mjpeg";

    /// chrono format used in gallery file names
    pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

    /// Directory under the system temp dir receiving unsaved captures
    pub const TEMP_SUBDIR: &str = "camera-session";
}

/// File formats recognized when scanning the gallery
pub mod file_formats {
    /// Supported image file extensions
    pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

    /// Supported video file extensions
    pub const VIDEO_EXTENSIONS: &[&str] = &["mjpeg", "mp4", "mkv", "webm"];

    /// Check if a file extension is a supported image format
    pub fn is_image_extension(ext: &str) -> bool {
        IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }

    /// Check if a file extension is a supported video format
    pub fn is_video_extension(ext: &str) -> bool {
        VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }
}

/// Timing constants
pub mod timing {
    use std::time::Duration;

    /// How long a simulated photo capture blocks
    pub const SIMULATED_PHOTO_LATENCY: Duration = Duration::from_millis(150);

    /// Frame interval of simulated recordings (~30 fps)
    pub const SIMULATED_FRAME_INTERVAL: Duration = Duration::from_millis(33);

    /// How often the CLI refreshes recording progress
    pub const RECORDING_PROGRESS_INTERVAL: Duration = Duration::from_millis(200);
}

/// Simulated backend parameters
pub mod simulated {
    pub const PHOTO_WIDTH: u32 = 640;
    pub const PHOTO_HEIGHT: u32 = 480;

    pub const FRAME_WIDTH: u32 = 320;
    pub const FRAME_HEIGHT: u32 = 240;

    /// JPEG quality of recorded frames
    pub const VIDEO_JPEG_QUALITY: u8 = 75;
}

/// V4L2 backend parameters
pub mod v4l2 {
    /// Directory scanned for capture nodes
    pub const DEV_DIR: &str = "/dev";

    /// File name prefix of capture nodes
    pub const NODE_PREFIX: &str = "video";

    /// Number of mmap buffers per stream
    pub const STREAM_BUFFERS: u32 = 4;

    /// Resolution requested when negotiating a format
    pub const PREFERRED_WIDTH: u32 = 1280;
    pub const PREFERRED_HEIGHT: u32 = 720;

    /// Preferred pixel format (frames are already JPEG)
    pub const FOURCC_MJPG: &[u8; 4] = b"MJPG";

    /// Fallback pixel format, converted and encoded in software
    pub const FOURCC_YUYV: &[u8; 4] = b"YUYV";

    /// JPEG quality used when recording YUYV frames
    pub const VIDEO_JPEG_QUALITY: u8 = 80;
}

/// Application information utilities
pub mod app_info {
    use std::path::Path;

    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }

    /// Check if the application is running inside a Flatpak sandbox
    pub fn is_flatpak() -> bool {
        Path::new("/.flatpak-info").exists()
    }

    /// Get the runtime environment string (e.g., "Flatpak" or "Native")
    pub fn runtime_environment() -> &'static str {
        if is_flatpak() { "Flatpak" } else { "Native" }
    }
}
