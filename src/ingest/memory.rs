use std::collections::VecDeque;

use anyhow::Result;
use image::RgbImage;

use super::{VideoInfo, VideoSource};

/// Frames held in memory, yielded in insertion order.
///
/// Dimensions are taken from the first frame; an empty source reports 0x0.
#[derive(Debug)]
pub struct MemorySource {
    info: VideoInfo,
    frames: VecDeque<RgbImage>,
}

impl MemorySource {
    pub fn new(fps: f64, frames: Vec<RgbImage>) -> Self {
        let (width, height) = frames.first().map_or((0, 0), |f| f.dimensions());
        Self {
            info: VideoInfo {
                fps,
                total_frames: frames.len() as u64,
                width,
                height,
            },
            frames: frames.into(),
        }
    }

    /// Remaining frames not yet read.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl VideoSource for MemorySource {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        Ok(self.frames.pop_front())
    }
}
