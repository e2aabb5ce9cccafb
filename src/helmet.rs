//! Head-region helmet scoring.
//!
//! A heuristic stand-in for a dedicated helmet classifier: the top quarter of
//! a rider's box is converted to HSV, pixels inside any helmet-typical color
//! range are counted, and a round dominant blob raises the score. Brightly
//! colored round objects score as helmets too.

use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::arc_length;
use imageproc::point::Point as PixelPoint;
use serde::{Deserialize, Serialize};

use crate::geometry::BBox;

/// Fraction of the person box height taken as the head region.
pub const HEAD_FRACTION: f32 = 0.25;
/// Score above which a helmet is reported.
pub const HELMET_SCORE_THRESHOLD: f32 = 0.35;
/// Coverage above which the blob shape is taken into account.
pub const SHAPE_CHECK_COVERAGE: f32 = 0.15;

const COVERAGE_WEIGHT: f32 = 0.6;
const CIRCULARITY_WEIGHT: f32 = 0.4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HelmetColor {
    Red,
    Blue,
    White,
    Black,
    Yellow,
    Green,
    Unknown,
}

/// Inclusive range in 8-bit HSV (hue 0..=180, saturation and value 0..=255).
#[derive(Clone, Copy, Debug)]
pub struct HsvRange {
    pub color: HelmetColor,
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    const fn new(color: HelmetColor, lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self {
            color,
            lower,
            upper,
        }
    }

    #[inline]
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| self.lower[i] <= hsv[i] && hsv[i] <= self.upper[i])
    }
}

/// Helmet-typical color ranges. Red wraps around hue 0 and is split in two.
pub const HELMET_COLOR_RANGES: [HsvRange; 7] = [
    HsvRange::new(HelmetColor::Red, [0, 100, 100], [10, 255, 255]),
    HsvRange::new(HelmetColor::Red, [170, 100, 100], [180, 255, 255]),
    HsvRange::new(HelmetColor::Blue, [100, 100, 100], [130, 255, 255]),
    HsvRange::new(HelmetColor::White, [0, 0, 200], [180, 30, 255]),
    HsvRange::new(HelmetColor::Black, [0, 0, 0], [180, 255, 50]),
    HsvRange::new(HelmetColor::Yellow, [20, 100, 100], [30, 255, 255]),
    HsvRange::new(HelmetColor::Green, [40, 100, 100], [80, 255, 255]),
];

/// 8-bit RGB to 8-bit HSV with hue halved into 0..180.
pub fn rgb_to_hsv8(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(f32::from);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = v - min;

    let s = if v > 0.0 { 255.0 * delta / v } else { 0.0 };

    let mut h = if delta == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / delta
    } else if v == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    [
        (h / 2.0).round().min(180.0) as u8,
        s.round() as u8,
        v as u8,
    ]
}

/// Why an analysis could not look at any pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisFailure {
    InvalidRegion,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HelmetAnalysis {
    pub has_helmet: bool,
    pub confidence: f32,
    pub helmet_color: HelmetColor,
    /// Head crop `[x1, y1, x2, y2]` before clamping to the frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_box: Option<[i32; 4]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<AnalysisFailure>,
}

impl HelmetAnalysis {
    fn failed(reason: AnalysisFailure) -> Self {
        Self {
            has_helmet: false,
            confidence: 0.0,
            helmet_color: HelmetColor::Unknown,
            head_box: None,
            reason: Some(reason),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct HelmetAnalyzer;

impl HelmetAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Score the head region of `person` inside `frame`.
    pub fn analyze(&self, frame: &RgbImage, person: &BBox) -> HelmetAnalysis {
        // Truncate like an integer cast of the detector's float box.
        let (x1, y1, x2, y2) = (
            person.x1 as i64,
            person.y1 as i64,
            person.x2 as i64,
            person.y2 as i64,
        );
        let head_height = ((y2 - y1) as f32 * HEAD_FRACTION) as i64;

        let (w, h) = (frame.width() as i64, frame.height() as i64);
        let (cx1, cx2) = (x1.clamp(0, w), x2.clamp(0, w));
        let (cy1, cy2) = (y1.clamp(0, h), (y1 + head_height).clamp(0, h));

        if cx2 <= cx1 || cy2 <= cy1 {
            log::debug!("empty head region for person box {:?}", person);
            return HelmetAnalysis::failed(AnalysisFailure::InvalidRegion);
        }

        let head = imageops::crop_imm(
            frame,
            cx1 as u32,
            cy1 as u32,
            (cx2 - cx1) as u32,
            (cy2 - cy1) as u32,
        )
        .to_image();
        let region = HsvRegion::from_rgb(&head);
        let score = helmet_score(&region);

        HelmetAnalysis {
            has_helmet: score > HELMET_SCORE_THRESHOLD,
            confidence: score,
            helmet_color: dominant_color(&region),
            head_box: Some([
                x1 as i32,
                y1 as i32,
                x2 as i32,
                (y1 + head_height) as i32,
            ]),
            reason: None,
        }
    }
}

struct HsvRegion {
    width: u32,
    height: u32,
    pixels: Vec<[u8; 3]>,
}

impl HsvRegion {
    fn from_rgb(image: &RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            pixels: image.pixels().map(|p| rgb_to_hsv8(p.0)).collect(),
        }
    }

    fn mask(&self, matches: impl Fn([u8; 3]) -> bool) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            let hsv = self.pixels[(y * self.width + x) as usize];
            if matches(hsv) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }
}

fn helmet_score(region: &HsvRegion) -> f32 {
    let total = region.pixels.len();
    if total == 0 {
        return 0.0;
    }

    let mask = region.mask(|hsv| HELMET_COLOR_RANGES.iter().any(|r| r.contains(hsv)));
    let covered = mask.pixels().filter(|p| p.0[0] > 0).count();
    let coverage = covered as f32 / total as f32;

    let mut score = coverage;
    if coverage > SHAPE_CHECK_COVERAGE {
        if let Some(circularity) = largest_blob_circularity(&mask) {
            score = coverage * COVERAGE_WEIGHT + circularity * CIRCULARITY_WEIGHT;
        }
    }

    score.clamp(0.0, 1.0)
}

/// Circularity `4πA / P²` of the largest outer contour in `mask`.
///
/// `None` when the mask has no contours or the largest has zero perimeter.
fn largest_blob_circularity(mask: &GrayImage) -> Option<f32> {
    let largest = find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .map(|c| (polygon_area(&c.points), c.points))
        .max_by(|a, b| a.0.total_cmp(&b.0))?;

    let (area, points) = largest;
    let perimeter = arc_length(&points, true);
    if perimeter > 0.0 {
        Some((4.0 * std::f64::consts::PI * area / (perimeter * perimeter)) as f32)
    } else {
        None
    }
}

/// Shoelace area of a closed pixel contour.
fn polygon_area(points: &[PixelPoint<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    (twice as f64 / 2.0).abs()
}

/// Color range with the most matching pixels; ties keep the earlier range.
fn dominant_color(region: &HsvRegion) -> HelmetColor {
    let mut best = HelmetColor::Unknown;
    let mut best_count = 0;
    for range in &HELMET_COLOR_RANGES {
        let count = region.pixels.iter().filter(|&&p| range.contains(p)).count();
        if count > best_count {
            best_count = count;
            best = range.color;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::draw_filled_circle_mut;

    fn frame_with_head(fill: [u8; 3]) -> RgbImage {
        let mut frame = RgbImage::from_pixel(200, 200, Rgb([128, 128, 128]));
        for y in 0..50 {
            for x in 0..100 {
                frame.put_pixel(x, y, Rgb(fill));
            }
        }
        frame
    }

    #[test]
    fn hsv_matches_eight_bit_convention() {
        assert_eq!(rgb_to_hsv8([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv8([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv8([0, 0, 255]), [120, 255, 255]);
        assert_eq!(rgb_to_hsv8([128, 128, 128]), [0, 0, 128]);
        assert_eq!(rgb_to_hsv8([0, 0, 0]), [0, 0, 0]);
    }

    #[test]
    fn black_head_is_a_helmet() {
        let frame = frame_with_head([0, 0, 0]);
        let analysis = HelmetAnalyzer::new().analyze(&frame, &BBox::new(0.0, 0.0, 100.0, 200.0));
        assert!(analysis.has_helmet);
        assert!(analysis.confidence >= 0.6);
        assert_eq!(analysis.helmet_color, HelmetColor::Black);
        assert_eq!(analysis.head_box, Some([0, 0, 100, 50]));
        assert!(analysis.reason.is_none());
    }

    #[test]
    fn gray_head_is_not_a_helmet() {
        let frame = frame_with_head([128, 128, 128]);
        let analysis = HelmetAnalyzer::new().analyze(&frame, &BBox::new(0.0, 0.0, 100.0, 200.0));
        assert!(!analysis.has_helmet);
        assert_eq!(analysis.confidence, 0.0);
        assert_eq!(analysis.helmet_color, HelmetColor::Unknown);
    }

    #[test]
    fn red_head_reports_red() {
        let frame = frame_with_head([220, 10, 10]);
        let analysis = HelmetAnalyzer::new().analyze(&frame, &BBox::new(0.0, 0.0, 100.0, 200.0));
        assert!(analysis.has_helmet);
        assert_eq!(analysis.helmet_color, HelmetColor::Red);
    }

    #[test]
    fn round_blob_scores_above_sparse_coverage() {
        let mut frame = RgbImage::from_pixel(100, 200, Rgb([128, 128, 128]));
        draw_filled_circle_mut(&mut frame, (50, 25), 20, Rgb([20, 20, 230]));
        let analysis = HelmetAnalyzer::new().analyze(&frame, &BBox::new(0.0, 0.0, 100.0, 200.0));

        // ~1250 of 5000 pixels covered, boosted by a near-circular contour.
        assert!(analysis.has_helmet);
        assert!(analysis.confidence > 0.4);
        assert_eq!(analysis.helmet_color, HelmetColor::Blue);
    }

    #[test]
    fn degenerate_box_is_invalid_region() {
        let frame = frame_with_head([0, 0, 0]);
        // Height 3 gives a zero-row head crop.
        let analysis = HelmetAnalyzer::new().analyze(&frame, &BBox::new(10.0, 10.0, 60.0, 13.0));
        assert!(!analysis.has_helmet);
        assert_eq!(analysis.confidence, 0.0);
        assert_eq!(analysis.reason, Some(AnalysisFailure::InvalidRegion));
    }

    #[test]
    fn box_outside_frame_is_invalid_region() {
        let frame = frame_with_head([0, 0, 0]);
        let analysis =
            HelmetAnalyzer::new().analyze(&frame, &BBox::new(300.0, 300.0, 400.0, 500.0));
        assert_eq!(analysis.reason, Some(AnalysisFailure::InvalidRegion));
    }

    #[test]
    fn polygon_area_of_square_contour() {
        let square = [
            PixelPoint::new(0, 0),
            PixelPoint::new(10, 0),
            PixelPoint::new(10, 10),
            PixelPoint::new(0, 10),
        ];
        assert_eq!(polygon_area(&square), 100.0);
    }
}
