//! Video frame sources.
//!
//! - In-memory frame lists (tests, synthetic clips)
//! - Local video files (feature: ingest-file-ffmpeg)
//!
//! A source reports its frame rate, frame count and dimensions up front and
//! then yields frames in order until it returns `None`. Dropping a source
//! releases the underlying handle, which is how a run stops early.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod memory;

use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};

pub use file::{open_file, FileConfig};
pub use memory::MemorySource;

/// Stream properties known at open time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub fps: f64,
    /// Container-reported frame count; 0 when unknown.
    pub total_frames: u64,
    pub width: u32,
    pub height: u32,
}

impl VideoInfo {
    /// Container duration; 0 when the frame rate is unknown.
    pub fn duration_seconds(&self) -> f64 {
        if self.fps > 0.0 {
            self.total_frames as f64 / self.fps
        } else {
            0.0
        }
    }
}

pub trait VideoSource {
    fn info(&self) -> VideoInfo;

    /// Next decoded frame in display order, `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn info(&self) -> VideoInfo {
        (**self).info()
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        (**self).next_frame()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoIoErrorKind {
    Open,
    Read,
    InvalidDimensions,
}

/// A video that cannot be opened or read. Fatal for a processing run.
///
/// Returned inside `anyhow::Error`; use `downcast_ref::<VideoIoError>()`.
#[derive(Clone, Debug)]
pub struct VideoIoError {
    pub kind: VideoIoErrorKind,
    pub message: String,
}

impl VideoIoError {
    pub fn open(source: &str, reason: impl std::fmt::Display) -> Self {
        Self {
            kind: VideoIoErrorKind::Open,
            message: format!("cannot open video '{}': {}", source, reason),
        }
    }

    pub fn read(frame_number: u64, reason: impl std::fmt::Display) -> Self {
        Self {
            kind: VideoIoErrorKind::Read,
            message: format!("failed to read frame {}: {}", frame_number, reason),
        }
    }

    pub fn invalid_dimensions(width: u32, height: u32) -> Self {
        Self {
            kind: VideoIoErrorKind::InvalidDimensions,
            message: format!("video reports invalid dimensions {}x{}", width, height),
        }
    }
}

impl std::fmt::Display for VideoIoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "video I/O failure: {}", self.message)
    }
}
impl std::error::Error for VideoIoError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_io_error_is_downcastable() {
        let err = anyhow::Error::new(VideoIoError::read(7, "truncated"));
        let io = err.downcast_ref::<VideoIoError>().unwrap();
        assert_eq!(io.kind, VideoIoErrorKind::Read);
        assert!(err.to_string().contains("frame 7"));
    }

    #[test]
    fn duration_guards_unknown_rate() {
        let info = VideoInfo {
            fps: 0.0,
            total_frames: 100,
            width: 1,
            height: 1,
        };
        assert_eq!(info.duration_seconds(), 0.0);
    }
}
