//! Helmet Watch
//!
//! Estimates motorcycle helmet compliance from video footage.
//!
//! # Pipeline
//!
//! For every sampled frame an external object detector proposes person and
//! motorcycle boxes. Riders are paired with the nearest plausible
//! motorcycle, the top quarter of each rider box is scored for helmet-like
//! color and shape, and motorcycle centers are checked against an optional
//! counting line. Frame results aggregate into a per-video compliance rate.
//!
//! # Module Structure
//!
//! - `geometry`: boxes, points, IoU, segment tests
//! - `detect`: detector backends and detection types
//! - `matcher`: rider-to-motorcycle pairing
//! - `helmet`: head-region helmet scoring
//! - `line_crossing`: at-most-once counting line
//! - `frame`: frame sampling and region-of-interest masks
//! - `ingest`: video sources
//! - `pipeline`: per-frame processing and video aggregation
//! - `config`: file and environment configuration
//! - `storage`, `jobs`: video registry and processing jobs

use anyhow::Result;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod helmet;
pub mod ingest;
pub mod jobs;
pub mod line_crossing;
pub mod matcher;
pub mod pipeline;
pub mod storage;

pub use config::{AppConfig, CountingLine, PipelineConfig};
pub use detect::{Detection, DetectorBackend, ObjectClass, ScriptedBackend};
pub use geometry::{BBox, Point};
pub use helmet::{HelmetAnalysis, HelmetAnalyzer, HelmetColor};
pub use ingest::{MemorySource, VideoInfo, VideoIoError, VideoSource};
pub use line_crossing::{CrossingEvent, Direction, LineCrossingDetector, VerticalLineCrossing};
pub use matcher::{MatcherConfig, RiderMatch, RiderMatcher};
pub use pipeline::{CompliancePipeline, FrameResult, PerFrameIds, TrackAssigner, VideoResult};

/// Seconds since the Unix epoch.
pub fn now_s() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}
