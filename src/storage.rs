// SPDX-License-Identifier: MPL-2.0

//! Storage utilities for managing photo and video files
//!
//! Backends write captures into a temporary directory. A [`StorageSink`]
//! takes them from there into durable storage; [`GallerySink`] files them
//! under the user's Pictures and Videos directories with timestamped names.

use crate::constants::{file_formats, naming};
use crate::errors::StorageError;
use crate::session::CaptureResult;
use chrono::{DateTime, Local};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

/// Kind of media being persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    fn prefix(&self) -> &'static str {
        match self {
            MediaKind::Photo => naming::PHOTO_PREFIX,
            MediaKind::Video => naming::VIDEO_PREFIX,
        }
    }

    /// Classify a file by extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if file_formats::is_image_extension(ext) {
            Some(MediaKind::Photo)
        } else if file_formats::is_video_extension(ext) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

/// Moves finished captures into durable storage
pub trait StorageSink: Send + Sync {
    /// Persist the file at `temp_path`, returning its final location
    fn persist(&self, kind: MediaKind, temp_path: PathBuf) -> BoxFuture<'_, Result<PathBuf, StorageError>>;
}

/// Files captures into the gallery folders
#[derive(Debug, Clone)]
pub struct GallerySink {
    photos_dir: PathBuf,
    videos_dir: PathBuf,
}

impl GallerySink {
    pub fn new(photos_dir: impl Into<PathBuf>, videos_dir: impl Into<PathBuf>) -> Self {
        Self {
            photos_dir: photos_dir.into(),
            videos_dir: videos_dir.into(),
        }
    }

    /// `~/Pictures/<folder>` and `~/Videos/<folder>`
    ///
    /// Falls back to the home directory when XDG user dirs are not set up.
    pub fn for_folder(folder: &str) -> Result<Self, StorageError> {
        let home = dirs::home_dir();
        let pictures = dirs::picture_dir()
            .or_else(|| home.as_ref().map(|h| h.join("Pictures")))
            .ok_or(StorageError::NoDestination)?;
        let videos = dirs::video_dir()
            .or_else(|| home.as_ref().map(|h| h.join("Videos")))
            .ok_or(StorageError::NoDestination)?;

        Ok(Self::new(pictures.join(folder), videos.join(folder)))
    }

    pub fn dir_for(&self, kind: MediaKind) -> &Path {
        match kind {
            MediaKind::Photo => &self.photos_dir,
            MediaKind::Video => &self.videos_dir,
        }
    }
}

impl StorageSink for GallerySink {
    fn persist(&self, kind: MediaKind, temp_path: PathBuf) -> BoxFuture<'_, Result<PathBuf, StorageError>> {
        let dir = self.dir_for(kind).to_path_buf();
        async move {
            tokio::task::spawn_blocking(move || move_into(&dir, kind, &temp_path, Local::now()))
                .await
                .map_err(|e| StorageError::Io(format!("storage task failed: {}", e)))?
        }
        .boxed()
    }
}

/// Gallery file name for a capture taken at `timestamp`
///
/// `attempt` 0 is the plain name, later attempts append `_N`.
pub fn gallery_file_name(kind: MediaKind, timestamp: DateTime<Local>, extension: &str, attempt: u32) -> String {
    let stamp = timestamp.format(naming::TIMESTAMP_FORMAT);
    if attempt == 0 {
        format!("{}_{}.{}", kind.prefix(), stamp, extension)
    } else {
        format!("{}_{}_{}.{}", kind.prefix(), stamp, attempt, extension)
    }
}

fn move_into(
    dir: &Path,
    kind: MediaKind,
    source: &Path,
    timestamp: DateTime<Local>,
) -> Result<PathBuf, StorageError> {
    if !source.is_file() {
        return Err(StorageError::MissingSource(source.to_path_buf()));
    }
    std::fs::create_dir_all(dir)?;

    let extension = source
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or(match kind {
            MediaKind::Photo => naming::PHOTO_EXTENSION,
            MediaKind::Video => naming::VIDEO_EXTENSION,
        })
        .to_ascii_lowercase();

    let destination = (0..)
        .map(|attempt| dir.join(gallery_file_name(kind, timestamp, &extension, attempt)))
        .find(|candidate| !candidate.exists())
        .ok_or(StorageError::NoDestination)?;

    if let Err(e) = std::fs::rename(source, &destination) {
        // Temp dir and gallery can live on different filesystems
        debug!(error = %e, "Rename failed, copying instead");
        std::fs::copy(source, &destination)?;
        std::fs::remove_file(source)?;
    }

    info!(kind = ?kind, path = %destination.display(), "Capture saved to gallery");
    Ok(destination)
}

/// Hand a capture result to a sink
///
/// A failed capture has nothing to save and is returned as an error.
pub async fn archive(sink: &dyn StorageSink, result: CaptureResult) -> Result<PathBuf, StorageError> {
    match result {
        CaptureResult::PhotoSaved { path } => sink.persist(MediaKind::Photo, path).await,
        CaptureResult::VideoSaved { path } => sink.persist(MediaKind::Video, path).await,
        CaptureResult::Failed { reason } => Err(StorageError::CaptureFailed(reason)),
    }
}

/// Newest media file in a gallery folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestCapture {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub modified: SystemTime,
    /// Image size, for photos that could be read
    pub dimensions: Option<(u32, u32)>,
}

/// Find the most recent capture in `dir`
///
/// Scans for known photo and video extensions and picks the newest by
/// modification time.
pub async fn latest_capture(dir: PathBuf) -> Option<LatestCapture> {
    tokio::task::spawn_blocking(move || {
        let mut newest: Option<(SystemTime, PathBuf, MediaKind)> = None;

        for entry in std::fs::read_dir(&dir).ok()?.flatten() {
            let path = entry.path();
            let Some(kind) = MediaKind::from_path(&path) else {
                continue;
            };
            let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) else {
                continue;
            };
            if newest.as_ref().is_none_or(|(t, _, _)| modified > *t) {
                newest = Some((modified, path, kind));
            }
        }

        let (modified, path, kind) = newest?;
        debug!(path = %path.display(), "Found latest capture");

        let dimensions = match kind {
            MediaKind::Photo => image::image_dimensions(&path).ok(),
            MediaKind::Video => None,
        };

        Some(LatestCapture {
            path,
            kind,
            modified,
            dimensions,
        })
    })
    .await
    .ok()?
}
