//! Per-video compliance aggregation.
//!
//! For every sampled frame: mask to the region of interest, detect, pair
//! riders with motorcycles, score each rider's head region, assign
//! motorcycle ids, update the counting line. Frame results fold into a
//! `VideoResult`.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::detect::{split_detections, Detection, DetectorBackend};
use crate::frame::{timestamp_seconds, FrameSampler, RoiMask};
use crate::geometry::Point;
use crate::helmet::{HelmetAnalysis, HelmetAnalyzer};
use crate::ingest::{VideoIoError, VideoSource};
use crate::line_crossing::{CrossingEvent, LineCrossingDetector};
use crate::matcher::RiderMatcher;

// ----------------------------------------------------------------------------
// Motorcycle identity
// ----------------------------------------------------------------------------

/// Assigns an id to every motorcycle detection of a frame.
///
/// Ids that repeat across frames are treated as the same vehicle by the
/// counting line.
pub trait TrackAssigner {
    /// One id per entry of `motorcycles`, in order.
    fn assign(&mut self, frame_number: u64, motorcycles: &[Detection]) -> Vec<String>;

    /// Forget all state before a new video.
    fn reset(&mut self) {}
}

/// Issues a fresh `moto_{frame}_{n}` id for every detection, `n` being the
/// number of ids issued so far. No two detections ever share an id, so the
/// distinct-motorcycle count equals the number of motorcycle detections.
#[derive(Debug, Default)]
pub struct PerFrameIds {
    issued: usize,
}

impl TrackAssigner for PerFrameIds {
    fn assign(&mut self, frame_number: u64, motorcycles: &[Detection]) -> Vec<String> {
        motorcycles
            .iter()
            .map(|_| {
                let id = format!("moto_{}_{}", frame_number, self.issued);
                self.issued += 1;
                id
            })
            .collect()
    }

    fn reset(&mut self) {
        self.issued = 0;
    }
}

// ----------------------------------------------------------------------------
// Results
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    pub frame_number: u64,
    pub timestamp_seconds: f64,
    pub motorcycle_count: usize,
    /// Riders matched to a motorcycle; unmatched people are not counted.
    pub occupant_count: usize,
    pub helmets_worn_count: usize,
    pub helmets_missing_count: usize,
    pub detections: Vec<Detection>,
    pub helmet_analyses: Vec<HelmetAnalysis>,
    pub motorcycle_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub crossed_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub detection_failed: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoSummary {
    pub motorcycles: usize,
    pub compliance_percentage: f64,
    pub processed_frames: u64,
    pub average_occupants_per_frame: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineCrossingSummary {
    pub count: usize,
    pub events: Vec<CrossingEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoResult {
    pub total_frames: u64,
    pub processed_frames: u64,
    /// Size of the motorcycle id set; see [`PerFrameIds`].
    pub motorcycles_detected: usize,
    pub total_occupants: usize,
    pub helmets_worn: usize,
    pub helmets_not_worn: usize,
    /// Percentage rounded to two decimals; 0 when no rider was scored.
    pub compliance_rate: f64,
    pub video_duration_seconds: f64,
    pub failed_detection_frames: u64,
    pub frames: Vec<FrameResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_crossings: Option<LineCrossingSummary>,
    pub summary: VideoSummary,
}

/// Percentage of scored riders wearing a helmet, 0 when nobody was scored.
pub fn compliance_rate(worn: usize, not_worn: usize) -> f64 {
    let total = worn + not_worn;
    if total == 0 {
        0.0
    } else {
        worn as f64 / total as f64 * 100.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ----------------------------------------------------------------------------
// Pipeline
// ----------------------------------------------------------------------------

pub struct CompliancePipeline {
    config: PipelineConfig,
    detector: Box<dyn DetectorBackend>,
    matcher: RiderMatcher,
    analyzer: HelmetAnalyzer,
    roi: Option<RoiMask>,
    line_counter: Option<LineCrossingDetector>,
    tracks: Box<dyn TrackAssigner>,
    last_centers: HashMap<String, Point>,
}

impl CompliancePipeline {
    pub fn new(config: PipelineConfig, detector: Box<dyn DetectorBackend>) -> Result<Self> {
        config.validate()?;
        let roi = config.roi.as_deref().map(RoiMask::new).transpose()?;
        let line_counter = config
            .counting_line
            .map(|line| LineCrossingDetector::new(line.start, line.end));
        log::info!(
            "pipeline ready: detector={} confidence={} stride={} roi={} counting_line={}",
            detector.name(),
            config.confidence_threshold,
            config.frame_stride,
            roi.is_some(),
            line_counter.is_some()
        );

        Ok(Self {
            matcher: RiderMatcher::new(config.matcher),
            config,
            detector,
            analyzer: HelmetAnalyzer::new(),
            roi,
            line_counter,
            tracks: Box::new(PerFrameIds::default()),
            last_centers: HashMap::new(),
        })
    }

    /// Replace the default per-frame motorcycle ids.
    pub fn with_track_assigner(mut self, tracks: Box<dyn TrackAssigner>) -> Self {
        self.tracks = tracks;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn line_counter(&self) -> Option<&LineCrossingDetector> {
        self.line_counter.as_ref()
    }

    /// Clear per-video state: crossed ids, track ids, previous centers and
    /// the detector's own state.
    pub fn reset(&mut self) {
        self.detector.reset();
        if let Some(counter) = self.line_counter.as_mut() {
            counter.reset();
        }
        self.tracks.reset();
        self.last_centers.clear();
    }

    /// Run one frame through detection, matching, helmet scoring and the
    /// counting line. Detector failures yield an empty frame result with
    /// `detection_failed` set.
    pub fn process_frame(
        &mut self,
        frame: &RgbImage,
        frame_number: u64,
        timestamp_seconds: f64,
    ) -> FrameResult {
        let frame: Cow<'_, RgbImage> = match self.roi.as_mut() {
            Some(roi) => {
                let mut masked = frame.clone();
                roi.apply(&mut masked);
                Cow::Owned(masked)
            }
            None => Cow::Borrowed(frame),
        };

        self.detector.begin_frame(frame_number);
        let (raw, detection_failed) =
            match self.detector.detect(&frame, self.config.confidence_threshold) {
                Ok(dets) => (dets, false),
                Err(e) => {
                    log::warn!("detection failed on frame {}: {:#}", frame_number, e);
                    (Vec::new(), true)
                }
            };
        let dets = split_detections(raw);

        let helmet_analyses: Vec<HelmetAnalysis> = self
            .matcher
            .match_riders(&dets.people, &dets.motorcycles)
            .iter()
            .map(|m| self.analyzer.analyze(&frame, &m.person.bbox))
            .collect();
        let helmets_worn_count = helmet_analyses.iter().filter(|a| a.has_helmet).count();

        let motorcycle_ids = self.tracks.assign(frame_number, &dets.motorcycles);
        let crossed_ids = self.update_counting_line(frame_number, &motorcycle_ids, &dets.motorcycles);

        FrameResult {
            frame_number,
            timestamp_seconds,
            motorcycle_count: dets.motorcycles.len(),
            occupant_count: helmet_analyses.len(),
            helmets_worn_count,
            helmets_missing_count: helmet_analyses.len() - helmets_worn_count,
            detections: dets.boxes,
            helmet_analyses,
            motorcycle_ids,
            crossed_ids,
            detection_failed,
        }
    }

    fn update_counting_line(
        &mut self,
        frame_number: u64,
        ids: &[String],
        motorcycles: &[Detection],
    ) -> Vec<String> {
        let mut crossed = Vec::new();
        let mut centers = HashMap::with_capacity(ids.len());

        for (id, moto) in ids.iter().zip(motorcycles) {
            let current = moto.bbox.center();
            if let (Some(counter), Some(previous)) =
                (self.line_counter.as_mut(), self.last_centers.get(id))
            {
                if counter.check_crossing(id, *previous, current, frame_number) {
                    crossed.push(id.clone());
                }
            }
            centers.insert(id.clone(), current);
        }

        self.last_centers = centers;
        crossed
    }

    /// Process a whole video from `source`.
    ///
    /// Line-crossing and track state are reset first. Fails with a
    /// `VideoIoError` when the source reports no frame size or a frame cannot
    /// be read; per-frame detector failures do not fail the run.
    pub fn process_video(&mut self, source: &mut dyn VideoSource) -> Result<VideoResult> {
        let info = source.info();
        if info.width == 0 || info.height == 0 {
            return Err(VideoIoError::invalid_dimensions(info.width, info.height).into());
        }
        log::info!(
            "video: {}x{} @ {:.2} fps, {} frames",
            info.width,
            info.height,
            info.fps,
            info.total_frames
        );

        self.reset();
        let sampler = FrameSampler::new(self.config.frame_stride, self.config.max_frames);
        let mut frames: Vec<FrameResult> = Vec::new();
        let mut motorcycle_ids: HashSet<String> = HashSet::new();
        let mut frame_number = 0u64;

        while !sampler.exhausted(frames.len() as u64) {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    return Err(VideoIoError::read(frame_number + 1, format!("{:#}", e)).into())
                }
            };
            frame_number += 1;
            if !sampler.should_process(frame_number) {
                continue;
            }

            let result =
                self.process_frame(&frame, frame_number, timestamp_seconds(frame_number, info.fps));
            motorcycle_ids.extend(result.motorcycle_ids.iter().cloned());
            frames.push(result);
        }

        // Containers that do not report a frame count fall back to frames read.
        let total_frames = if info.total_frames > 0 {
            info.total_frames
        } else {
            frame_number
        };
        let result = self.summarize(
            total_frames,
            info.fps,
            motorcycle_ids.len(),
            frames,
        );
        log::info!(
            "video processing complete: {} frames, {} motorcycles, {:.1}% compliance",
            result.processed_frames,
            result.motorcycles_detected,
            result.summary.compliance_percentage
        );
        Ok(result)
    }

    fn summarize(
        &self,
        total_frames: u64,
        fps: f64,
        motorcycles: usize,
        frames: Vec<FrameResult>,
    ) -> VideoResult {
        let processed_frames = frames.len() as u64;
        let helmets_worn: usize = frames.iter().map(|f| f.helmets_worn_count).sum();
        let helmets_not_worn: usize = frames.iter().map(|f| f.helmets_missing_count).sum();
        let total_occupants: usize = frames.iter().map(|f| f.occupant_count).sum();
        let failed_detection_frames = frames.iter().filter(|f| f.detection_failed).count() as u64;
        let rate = compliance_rate(helmets_worn, helmets_not_worn);

        let average_occupants_per_frame = if processed_frames > 0 {
            round2(total_occupants as f64 / processed_frames as f64)
        } else {
            0.0
        };

        VideoResult {
            total_frames,
            processed_frames,
            motorcycles_detected: motorcycles,
            total_occupants,
            helmets_worn,
            helmets_not_worn,
            compliance_rate: round2(rate),
            video_duration_seconds: if fps > 0.0 {
                total_frames as f64 / fps
            } else {
                0.0
            },
            failed_detection_frames,
            frames,
            line_crossings: self.line_counter.as_ref().map(|c| LineCrossingSummary {
                count: c.count(),
                events: c.crossings().to_vec(),
            }),
            summary: VideoSummary {
                motorcycles,
                compliance_percentage: rate,
                processed_frames,
                average_occupants_per_frame,
            },
        }
    }
}
