use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::geometry::Point;
use crate::matcher::MatcherConfig;

const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
const DEFAULT_FRAME_STRIDE: u64 = 1;
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_MAX_VIDEO_SIZE_MB: f64 = 100.0;
const DEFAULT_ALLOWED_FORMATS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    pipeline: Option<PipelineConfigFile>,
    detector: Option<DetectorConfigFile>,
    storage: Option<StorageConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    confidence_threshold: Option<f32>,
    frame_stride: Option<u64>,
    max_frames: Option<u64>,
    roi: Option<Vec<Point>>,
    counting_line: Option<CountingLine>,
    matcher: Option<MatcherConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct StorageConfigFile {
    max_video_size_mb: Option<f64>,
    allowed_formats: Option<Vec<String>>,
}

/// Segment used for line-crossing counts.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CountingLine {
    pub start: Point,
    pub end: Point,
}

/// Everything a `CompliancePipeline` needs; no ambient lookups.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub confidence_threshold: f32,
    /// Process frames whose 1-based number is a multiple of this.
    pub frame_stride: u64,
    /// Stop after this many processed frames.
    pub max_frames: Option<u64>,
    pub roi: Option<Vec<Point>>,
    pub counting_line: Option<CountingLine>,
    pub matcher: MatcherConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            frame_stride: DEFAULT_FRAME_STRIDE,
            max_frames: None,
            roi: None,
            counting_line: None,
            matcher: MatcherConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            bail!(
                "confidence threshold must be within [0, 1], got {}",
                self.confidence_threshold
            );
        }
        if self.frame_stride == 0 {
            bail!("frame stride must be at least 1");
        }
        if self.max_frames == Some(0) {
            bail!("max frames must be greater than zero when set");
        }
        if let Some(roi) = &self.roi {
            if roi.len() < 3 {
                bail!("region of interest needs at least 3 points, got {}", roi.len());
            }
        }
        if let Some(line) = &self.counting_line {
            if line.start == line.end {
                bail!("counting line endpoints must differ");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub model_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub iou_threshold: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageSettings {
    pub max_video_size_mb: f64,
    /// Lowercase extensions without the dot.
    pub allowed_formats: Vec<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            max_video_size_mb: DEFAULT_MAX_VIDEO_SIZE_MB,
            allowed_formats: DEFAULT_ALLOWED_FORMATS
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub detector: DetectorSettings,
    pub storage: StorageSettings,
}

impl AppConfig {
    /// Defaults, then the file named by `HELMET_CONFIG`, then `HELMET_*`
    /// overrides.
    pub fn load() -> Result<Self> {
        let config_path = env_value("HELMET_CONFIG").map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Like [`load`](Self::load) with an explicit config file.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Self {
        let defaults = PipelineConfig::default();
        let pipeline = match file.pipeline {
            Some(p) => PipelineConfig {
                confidence_threshold: p
                    .confidence_threshold
                    .unwrap_or(defaults.confidence_threshold),
                frame_stride: p.frame_stride.unwrap_or(defaults.frame_stride),
                max_frames: p.max_frames,
                roi: p.roi,
                counting_line: p.counting_line,
                matcher: p.matcher.unwrap_or_default(),
            },
            None => defaults,
        };
        let detector = DetectorSettings {
            model_path: file.detector.as_ref().and_then(|d| d.model_path.clone()),
            input_width: file
                .detector
                .as_ref()
                .and_then(|d| d.input_width)
                .unwrap_or(DEFAULT_INPUT_SIZE),
            input_height: file
                .detector
                .as_ref()
                .and_then(|d| d.input_height)
                .unwrap_or(DEFAULT_INPUT_SIZE),
            iou_threshold: file
                .detector
                .as_ref()
                .and_then(|d| d.iou_threshold)
                .unwrap_or(DEFAULT_IOU_THRESHOLD),
        };
        let storage_defaults = StorageSettings::default();
        let storage = StorageSettings {
            max_video_size_mb: file
                .storage
                .as_ref()
                .and_then(|s| s.max_video_size_mb)
                .unwrap_or(storage_defaults.max_video_size_mb),
            allowed_formats: file
                .storage
                .and_then(|s| s.allowed_formats)
                .unwrap_or(storage_defaults.allowed_formats),
        };
        Self {
            pipeline,
            detector,
            storage,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_value("HELMET_CONFIDENCE_THRESHOLD") {
            self.pipeline.confidence_threshold = v
                .parse()
                .map_err(|_| anyhow!("HELMET_CONFIDENCE_THRESHOLD must be a number"))?;
        }
        if let Some(v) = env_value("HELMET_FRAME_STRIDE") {
            self.pipeline.frame_stride = v
                .parse()
                .map_err(|_| anyhow!("HELMET_FRAME_STRIDE must be a positive integer"))?;
        }
        if let Some(v) = env_value("HELMET_MAX_FRAMES") {
            self.pipeline.max_frames = Some(
                v.parse()
                    .map_err(|_| anyhow!("HELMET_MAX_FRAMES must be a positive integer"))?,
            );
        }
        if let Some(v) = env_value("HELMET_ROI") {
            self.pipeline.roi = Some(parse_points(&v)?);
        }
        if let Some(v) = env_value("HELMET_COUNTING_LINE") {
            self.pipeline.counting_line = Some(parse_counting_line(&v)?);
        }
        if let Some(v) = env_value("HELMET_MODEL_PATH") {
            self.detector.model_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env_value("HELMET_IOU_THRESHOLD") {
            self.detector.iou_threshold = v
                .parse()
                .map_err(|_| anyhow!("HELMET_IOU_THRESHOLD must be a number"))?;
        }
        if let Some(v) = env_value("HELMET_MAX_VIDEO_SIZE_MB") {
            self.storage.max_video_size_mb = v
                .parse()
                .map_err(|_| anyhow!("HELMET_MAX_VIDEO_SIZE_MB must be a number"))?;
        }
        if let Some(v) = env_value("HELMET_ALLOWED_FORMATS") {
            let parsed = split_csv(&v);
            if !parsed.is_empty() {
                self.storage.allowed_formats = parsed;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.pipeline.validate()?;

        if !(0.0..=1.0).contains(&self.detector.iou_threshold) {
            bail!("detector IoU threshold must be within [0, 1]");
        }
        if self.detector.input_width == 0 || self.detector.input_height == 0 {
            bail!("detector input size must be non-zero");
        }
        if self.storage.max_video_size_mb <= 0.0 {
            bail!("max video size must be greater than zero");
        }

        self.storage.allowed_formats = self
            .storage
            .allowed_formats
            .iter()
            .map(|f| f.trim_start_matches('.').to_lowercase())
            .collect();
        if self.storage.allowed_formats.is_empty() {
            bail!("at least one video format must be allowed");
        }
        Ok(())
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

/// Parse `x,y;x,y;...`.
pub fn parse_points(value: &str) -> Result<Vec<Point>> {
    value
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let coords: Vec<&str> = pair.split(',').map(str::trim).collect();
            match coords.as_slice() {
                [x, y] => {
                    let x: f32 = x.parse().map_err(|_| anyhow!("invalid x in '{}'", pair))?;
                    let y: f32 = y.parse().map_err(|_| anyhow!("invalid y in '{}'", pair))?;
                    Ok(Point::new(x, y))
                }
                _ => Err(anyhow!("expected 'x,y', got '{}'", pair)),
            }
        })
        .collect()
}

/// Parse `x1,y1;x2,y2`.
pub fn parse_counting_line(value: &str) -> Result<CountingLine> {
    match parse_points(value)?.as_slice() {
        [start, end] => Ok(CountingLine {
            start: *start,
            end: *end,
        }),
        other => Err(anyhow!(
            "counting line needs exactly 2 points, got {}",
            other.len()
        )),
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
