// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use camera_session::constants::{file_formats, format_duration, naming, timing};
use std::time::Duration;

#[test]
fn test_extension_lists_do_not_overlap() {
    for ext in file_formats::IMAGE_EXTENSIONS {
        assert!(
            !file_formats::is_video_extension(ext),
            "{} is listed as both image and video",
            ext
        );
    }
}

#[test]
fn test_capture_extensions_are_recognized() {
    // Whatever the backends write must show up in the gallery
    assert!(file_formats::is_image_extension(naming::PHOTO_EXTENSION));
    assert!(file_formats::is_video_extension(naming::VIDEO_EXTENSION));
    assert!(file_formats::is_image_extension("JPG"));
    assert!(!file_formats::is_image_extension("txt"));
}

#[test]
fn test_simulated_timing_is_sane() {
    assert!(timing::SIMULATED_FRAME_INTERVAL < timing::SIMULATED_PHOTO_LATENCY);
    assert!(timing::RECORDING_PROGRESS_INTERVAL >= timing::SIMULATED_FRAME_INTERVAL);
}

#[test]
fn test_format_duration_long_recordings() {
    assert_eq!(format_duration(Duration::from_secs(59)), "00:59");
    assert_eq!(format_duration(Duration::from_secs(3600)), "1:00:00");
    assert_eq!(format_duration(Duration::from_millis(1999)), "00:01");
}
