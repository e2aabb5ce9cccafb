//! Frame sampling and region-of-interest masking.
//!
//! - `FrameSampler`: decides which 1-based frame numbers are processed and
//!   when a run stops.
//! - `RoiMask`: rasterised polygon; pixels outside it are zeroed before the
//!   frame reaches the detector or the helmet analyzer.

use anyhow::{bail, Result};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point as PixelPoint;

use crate::geometry::Point;

// ----------------------------------------------------------------------------
// FrameSampler
// ----------------------------------------------------------------------------

/// Stride-based frame selection with an optional cap on processed frames.
#[derive(Clone, Copy, Debug)]
pub struct FrameSampler {
    stride: u64,
    max_frames: Option<u64>,
}

impl FrameSampler {
    /// A stride of 0 is treated as 1.
    pub fn new(stride: u64, max_frames: Option<u64>) -> Self {
        Self {
            stride: stride.max(1),
            max_frames,
        }
    }

    /// Frame numbers start at 1; frame `n` is sampled iff `n % stride == 0`.
    pub fn should_process(&self, frame_number: u64) -> bool {
        frame_number % self.stride == 0
    }

    /// True once `processed` has reached the cap.
    pub fn exhausted(&self, processed: u64) -> bool {
        self.max_frames.map_or(false, |max| processed >= max)
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }
}

/// Seconds since the start of the video; 0 when the rate is unknown.
pub fn timestamp_seconds(frame_number: u64, fps: f64) -> f64 {
    if fps > 0.0 {
        frame_number as f64 / fps
    } else {
        0.0
    }
}

// ----------------------------------------------------------------------------
// RoiMask
// ----------------------------------------------------------------------------

/// Polygon region of interest.
///
/// The raster is built lazily for the first frame size seen and rebuilt if
/// the size changes.
#[derive(Clone, Debug)]
pub struct RoiMask {
    polygon: Vec<PixelPoint<i32>>,
    raster: Option<GrayImage>,
}

impl RoiMask {
    /// Needs at least three distinct vertices. A trailing vertex equal to the
    /// first is treated as an explicit close and dropped.
    pub fn new(points: &[Point]) -> Result<Self> {
        let mut polygon: Vec<PixelPoint<i32>> = points
            .iter()
            .map(|p| PixelPoint::new(p.x.round() as i32, p.y.round() as i32))
            .collect();
        while polygon.len() > 1 && polygon.first() == polygon.last() {
            polygon.pop();
        }
        if polygon.len() < 3 {
            bail!("region of interest needs at least 3 points, got {}", polygon.len());
        }
        Ok(Self {
            polygon,
            raster: None,
        })
    }

    fn raster_for(&mut self, width: u32, height: u32) -> &GrayImage {
        let stale = self
            .raster
            .as_ref()
            .map_or(true, |r| r.dimensions() != (width, height));
        if stale {
            let mut raster = GrayImage::new(width, height);
            draw_polygon_mut(&mut raster, &self.polygon, Luma([255u8]));
            log::debug!(
                "region of interest rasterised for {}x{} ({} vertices)",
                width,
                height,
                self.polygon.len()
            );
            self.raster = Some(raster);
        }
        self.raster.get_or_insert_with(|| GrayImage::new(width, height))
    }

    /// Zero every pixel of `frame` outside the polygon.
    pub fn apply(&mut self, frame: &mut RgbImage) {
        let (width, height) = frame.dimensions();
        let raster = self.raster_for(width, height);
        for (x, y, pixel) in frame.enumerate_pixels_mut() {
            if raster.get_pixel(x, y).0[0] == 0 {
                *pixel = Rgb([0, 0, 0]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_one_processes_every_frame() {
        let sampler = FrameSampler::new(1, None);
        assert!((1..=10).all(|n| sampler.should_process(n)));
        assert!(!sampler.exhausted(1_000));
    }

    #[test]
    fn stride_three_processes_multiples() {
        let sampler = FrameSampler::new(3, Some(2));
        let picked: Vec<u64> = (1..=10).filter(|&n| sampler.should_process(n)).collect();
        assert_eq!(picked, vec![3, 6, 9]);
        assert!(!sampler.exhausted(1));
        assert!(sampler.exhausted(2));
    }

    #[test]
    fn zero_stride_is_clamped() {
        assert_eq!(FrameSampler::new(0, None).stride(), 1);
    }

    #[test]
    fn timestamp_guards_unknown_rate() {
        assert_eq!(timestamp_seconds(30, 30.0), 1.0);
        assert_eq!(timestamp_seconds(30, 0.0), 0.0);
    }

    #[test]
    fn roi_needs_three_points() {
        let closed_line = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 0.0),
        ];
        assert!(RoiMask::new(&closed_line).is_err());
    }

    #[test]
    fn roi_zeroes_outside_pixels() {
        let mut roi = RoiMask::new(&[
            Point::new(0.0, 0.0),
            Point::new(9.0, 0.0),
            Point::new(9.0, 9.0),
            Point::new(0.0, 9.0),
            Point::new(0.0, 0.0),
        ])
        .unwrap();
        let mut frame = RgbImage::from_pixel(20, 20, Rgb([200, 200, 200]));
        roi.apply(&mut frame);

        assert_eq!(frame.get_pixel(5, 5), &Rgb([200, 200, 200]));
        assert_eq!(frame.get_pixel(15, 15), &Rgb([0, 0, 0]));
        assert_eq!(frame.get_pixel(15, 2), &Rgb([0, 0, 0]));
    }

    #[test]
    fn roi_follows_frame_size_changes() {
        let mut roi = RoiMask::new(&[
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(4.0, 4.0),
        ])
        .unwrap();
        let mut small = RgbImage::from_pixel(8, 8, Rgb([255, 0, 0]));
        roi.apply(&mut small);
        let mut large = RgbImage::from_pixel(16, 16, Rgb([255, 0, 0]));
        roi.apply(&mut large);
        assert_eq!(large.get_pixel(12, 12), &Rgb([0, 0, 0]));
        assert_eq!(large.get_pixel(4, 1), &Rgb([255, 0, 0]));
    }
}
