//! Local file frame source.
//!
//! The file source:
//! - Reads frames from a local video file (no network access)
//! - Decodes video frames in-memory
//! - Serves a generated clip for `stub://` paths
//!
//! The file source MUST NOT fetch remote URLs.

use anyhow::Result;
use image::{Rgb, RgbImage};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::{VideoInfo, VideoIoError, VideoSource};

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path (e.g., "/var/lib/helmet/uploads/clip.mp4").
    pub path: String,
    /// Length of the generated clip for `stub://` paths.
    pub stub_frames: u64,
}

impl FileConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            stub_frames: 30,
        }
    }
}

/// Open a local video file.
///
/// Failures are `VideoIoError`s wrapped in `anyhow::Error`.
pub fn open_file(config: &FileConfig) -> Result<Box<dyn VideoSource>> {
    if !is_local_file_path(&config.path) {
        return Err(VideoIoError::open(
            &config.path,
            "file ingestion only supports local paths (no URL schemes)",
        )
        .into());
    }

    if config.path.starts_with("stub://") {
        log::info!("FileSource: opened {} (synthetic)", config.path);
        return Ok(Box::new(SyntheticFileSource::new(config.stub_frames)));
    }

    #[cfg(feature = "ingest-file-ffmpeg")]
    {
        let source = FfmpegFileSource::new(&config.path)
            .map_err(|e| VideoIoError::open(&config.path, format!("{:#}", e)))?;
        Ok(Box::new(source))
    }
    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    {
        Err(VideoIoError::open(
            &config.path,
            "file decoding requires the ingest-file-ffmpeg feature",
        )
        .into())
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

const STUB_WIDTH: u32 = 640;
const STUB_HEIGHT: u32 = 480;
const STUB_FPS: f64 = 30.0;

struct SyntheticFileSource {
    total: u64,
    produced: u64,
}

impl SyntheticFileSource {
    fn new(total: u64) -> Self {
        Self { total, produced: 0 }
    }
}

impl VideoSource for SyntheticFileSource {
    fn info(&self) -> VideoInfo {
        VideoInfo {
            fps: STUB_FPS,
            total_frames: self.total,
            width: STUB_WIDTH,
            height: STUB_HEIGHT,
        }
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.produced >= self.total {
            return Ok(None);
        }
        self.produced += 1;
        let shift = self.produced;
        Ok(Some(RgbImage::from_fn(STUB_WIDTH, STUB_HEIGHT, |x, y| {
            let v = ((x as u64 + y as u64 + shift) % 256) as u8;
            Rgb([v, v, v])
        })))
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}
