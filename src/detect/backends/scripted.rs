use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use serde::Deserialize;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::geometry::BBox;

/// Replays precomputed detections.
///
/// Entries are keyed by 1-based frame number, taken from `begin_frame`.
/// Without it, each `detect` call advances to the next frame.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: HashMap<u64, Vec<Detection>>,
    failing: Vec<u64>,
    pending: Option<u64>,
    last_frame: u64,
    calls: u64,
}

#[derive(Debug, Deserialize)]
struct ScriptedDetection {
    class: u32,
    confidence: f32,
    #[serde(rename = "box")]
    bbox: BBox,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a script of the form `{"3": [{"class": 3, "confidence": 0.9, "box": [..]}]}`.
    pub fn from_json(raw: &str) -> Result<Self> {
        let parsed: HashMap<String, Vec<ScriptedDetection>> =
            serde_json::from_str(raw).context("invalid detection script")?;
        let mut backend = Self::new();
        for (frame, dets) in parsed {
            let frame: u64 = frame
                .parse()
                .map_err(|_| anyhow!("detection script key '{}' is not a frame number", frame))?;
            backend.script.insert(
                frame,
                dets.into_iter()
                    .map(|d| Detection::new(d.class, d.confidence, d.bbox))
                    .collect(),
            );
        }
        Ok(backend)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read detection script {}", path.display()))?;
        Self::from_json(&raw)
    }

    /// Detections to return for `frame_number`.
    pub fn with_frame(mut self, frame_number: u64, detections: Vec<Detection>) -> Self {
        self.script.insert(frame_number, detections);
        self
    }

    /// Make `detect` fail on `frame_number`.
    pub fn failing_on(mut self, frame_number: u64) -> Self {
        self.failing.push(frame_number);
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn begin_frame(&mut self, frame_number: u64) {
        self.pending = Some(frame_number);
    }

    fn reset(&mut self) {
        self.pending = None;
        self.last_frame = 0;
    }

    fn detect(&mut self, _frame: &RgbImage, confidence: f32) -> Result<Vec<Detection>> {
        self.calls += 1;
        let frame_number = self.pending.take().unwrap_or(self.last_frame + 1);
        self.last_frame = frame_number;

        if self.failing.contains(&frame_number) {
            return Err(anyhow!("scripted failure on frame {}", frame_number));
        }

        Ok(self
            .script
            .get(&frame_number)
            .map(|dets| {
                dets.iter()
                    .filter(|d| d.confidence > confidence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::ObjectClass;

    #[test]
    fn replays_sequentially_and_filters_confidence() {
        let mut backend = ScriptedBackend::new().with_frame(
            2,
            vec![
                Detection::motorcycle(0.9, BBox::new(0.0, 0.0, 10.0, 10.0)),
                Detection::person(0.3, BBox::new(0.0, 0.0, 5.0, 5.0)),
            ],
        );
        let frame = RgbImage::new(4, 4);

        assert!(backend.detect(&frame, 0.5).unwrap().is_empty());
        let second = backend.detect(&frame, 0.5).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].class_name, ObjectClass::Motorcycle);
    }

    #[test]
    fn begin_frame_selects_the_scripted_entry() {
        let mut backend = ScriptedBackend::new()
            .with_frame(4, vec![Detection::motorcycle(0.9, BBox::new(0.0, 0.0, 10.0, 10.0))]);
        let frame = RgbImage::new(4, 4);

        backend.begin_frame(2);
        assert!(backend.detect(&frame, 0.5).unwrap().is_empty());
        backend.begin_frame(4);
        assert_eq!(backend.detect(&frame, 0.5).unwrap().len(), 1);
        // Sequential fallback continues from the last frame seen.
        assert!(backend.detect(&frame, 0.5).unwrap().is_empty());

        backend.reset();
        backend.begin_frame(4);
        assert_eq!(backend.detect(&frame, 0.5).unwrap().len(), 1);
        assert_eq!(backend.calls(), 4);
    }

    #[test]
    fn parses_json_script() {
        let mut backend = ScriptedBackend::from_json(
            r#"{"1": [{"class": 0, "confidence": 0.8, "box": [1, 2, 3, 4]}]}"#,
        )
        .unwrap();
        let dets = backend.detect(&RgbImage::new(1, 1), 0.25).unwrap();
        assert_eq!(dets[0].class_name, ObjectClass::Person);
        assert_eq!(dets[0].bbox, BBox::new(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn rejects_non_numeric_keys() {
        assert!(ScriptedBackend::from_json(r#"{"first": []}"#).is_err());
    }

    #[test]
    fn scripted_failure_surfaces_as_error() {
        let mut backend = ScriptedBackend::new().failing_on(1);
        assert!(backend.detect(&RgbImage::new(1, 1), 0.5).is_err());
        assert!(backend.detect(&RgbImage::new(1, 1), 0.5).is_ok());
    }
}
