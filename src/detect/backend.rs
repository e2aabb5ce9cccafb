use anyhow::Result;
use image::RgbImage;

use crate::detect::result::Detection;

/// Object detector seam.
///
/// The pipeline treats implementations as a black box producing boxes,
/// class ids and confidences. Boxes are in frame pixel coordinates.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame, keeping boxes above `confidence`.
    ///
    /// An `Err` is absorbed by the pipeline as an empty frame.
    fn detect(&mut self, frame: &RgbImage, confidence: f32) -> Result<Vec<Detection>>;

    /// Told the 1-based frame number before `detect` runs on that frame.
    fn begin_frame(&mut self, _frame_number: u64) {}

    /// Drop per-video state before a new video starts.
    fn reset(&mut self) {}

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
