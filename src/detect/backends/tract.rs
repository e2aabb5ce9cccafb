#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::geometry::{iou, BBox};

/// Tract-based backend for YOLOv8-style ONNX detectors.
///
/// Frames are stretched to the model input size. The model output is expected
/// as `[1, 4 + classes, anchors]` with center-size boxes in input pixels.
pub struct TractBackend {
    model: TypedSimplePlan<TypedModel>,
    width: u32,
    height: u32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "tract detector loaded from {} ({}x{})",
            model_path.display(),
            width,
            height
        );

        Ok(Self {
            model,
            width,
            height,
            iou_threshold: 0.45,
        })
    }

    /// Override the default non-maximum suppression overlap.
    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &RgbImage) -> Tensor {
        let resized = imageops::resize(frame, self.width, self.height, FilterType::Triangle);
        tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        )
        .into_tensor()
    }

    fn decode(
        &self,
        outputs: TVec<TValue>,
        frame_width: u32,
        frame_height: u32,
        confidence: f32,
    ) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let preds = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("detector output is not rank 3")?;
        let (attrs, anchors) = (preds.shape()[1], preds.shape()[2]);
        if attrs <= 4 {
            return Err(anyhow!("detector output has no class scores"));
        }

        let sx = frame_width as f32 / self.width as f32;
        let sy = frame_height as f32 / self.height as f32;

        let mut candidates = Vec::new();
        for i in 0..anchors {
            let mut class_id = 0;
            let mut score = f32::NEG_INFINITY;
            for c in 4..attrs {
                let v = preds[[0, c, i]];
                if v > score {
                    score = v;
                    class_id = c - 4;
                }
            }
            if score <= confidence {
                continue;
            }

            let (cx, cy) = (preds[[0, 0, i]] * sx, preds[[0, 1, i]] * sy);
            let (w, h) = (preds[[0, 2, i]] * sx, preds[[0, 3, i]] * sy);
            candidates.push(Detection::new(
                class_id as u32,
                score,
                BBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0),
            ));
        }

        Ok(non_maximum_suppression(candidates, self.iou_threshold))
    }
}

/// Greedy class-wise suppression, highest confidence first.
fn non_maximum_suppression(mut dets: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    dets.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(dets.len());
    for det in dets {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == det.class_id && iou(&k.bbox, &det.bbox) > iou_threshold);
        if !suppressed {
            kept.push(det);
        }
    }
    kept
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &RgbImage, confidence: f32) -> Result<Vec<Detection>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame.width(), frame.height(), confidence)
    }
}
