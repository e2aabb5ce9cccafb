//! helmet_scan - estimate helmet compliance for one video
//!
//! Detections come from an ONNX model (feature backend-tract) or from a JSON
//! file of per-frame detections recorded elsewhere. The `VideoResult` is
//! printed as a summary and optionally written as JSON.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use helmet_watch::config::{parse_counting_line, parse_points, AppConfig, DetectorSettings};
use helmet_watch::ingest::{open_file, FileConfig};
use helmet_watch::{CompliancePipeline, DetectorBackend, ScriptedBackend, VideoIoError};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "helmet_scan",
    about = "Estimate motorcycle helmet compliance for a video file"
)]
struct Args {
    /// Local video file (or stub://name for a generated clip)
    video: String,

    /// Config file (.toml or .json)
    #[arg(long, env = "HELMET_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Detection confidence threshold
    #[arg(long)]
    confidence: Option<f32>,

    /// Process every Nth frame
    #[arg(long)]
    stride: Option<u64>,

    /// Stop after this many processed frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Region of interest polygon, "x,y;x,y;x,y"
    #[arg(long, value_name = "POINTS")]
    roi: Option<String>,

    /// Counting line, "x1,y1;x2,y2"
    #[arg(long, value_name = "POINTS")]
    line: Option<String>,

    /// ONNX detector model
    #[arg(long, value_name = "PATH", conflicts_with = "detections")]
    model: Option<PathBuf>,

    /// JSON file of per-frame detections to replay instead of a model
    #[arg(long, value_name = "PATH")]
    detections: Option<PathBuf>,

    /// Write the full result as JSON
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run(Args::parse()) {
        eprintln!("helmet_scan: {:#}", e);
        let code = if e.downcast_ref::<VideoIoError>().is_some() {
            2
        } else {
            1
        };
        std::process::exit(code);
    }
}

fn run(args: Args) -> Result<()> {
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut cfg = {
        let _stage = ui.stage("Load configuration");
        AppConfig::load_from(args.config.as_deref())?
    };
    apply_args(&mut cfg, &args)?;
    cfg.pipeline.validate()?;

    let mut detector = {
        let _stage = ui.stage("Prepare detector");
        build_detector(&args, &cfg.detector)?
    };
    detector.warm_up()?;
    let mut pipeline = CompliancePipeline::new(cfg.pipeline.clone(), detector)?;

    let source = open_file(&FileConfig::new(args.video.as_str()))?;

    let result = {
        let _stage = ui.stage("Process video");
        let mut source = ui.track_frames(source);
        pipeline.process_video(&mut source)?
    };

    println!("helmet_scan: {}", args.video);
    println!("  frames processed : {} / {}", result.processed_frames, result.total_frames);
    println!("  duration         : {:.1}s", result.video_duration_seconds);
    println!("  motorcycles      : {}", result.motorcycles_detected);
    println!("  occupants        : {}", result.total_occupants);
    println!("  helmets worn     : {}", result.helmets_worn);
    println!("  helmets missing  : {}", result.helmets_not_worn);
    println!("  compliance       : {:.2}%", result.compliance_rate);
    if let Some(crossings) = &result.line_crossings {
        println!("  line crossings   : {}", crossings.count);
    }
    if result.failed_detection_frames > 0 {
        println!("  detector failures: {} frames", result.failed_detection_frames);
    }

    if let Some(out) = &args.out {
        let _stage = ui.stage("Write results");
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(out, json)
            .with_context(|| format!("failed to write {}", out.display()))?;
    }
    Ok(())
}

fn apply_args(cfg: &mut AppConfig, args: &Args) -> Result<()> {
    if let Some(confidence) = args.confidence {
        cfg.pipeline.confidence_threshold = confidence;
    }
    if let Some(stride) = args.stride {
        cfg.pipeline.frame_stride = stride;
    }
    if let Some(max) = args.max_frames {
        cfg.pipeline.max_frames = Some(max);
    }
    if let Some(roi) = &args.roi {
        cfg.pipeline.roi = Some(parse_points(roi).context("invalid --roi")?);
    }
    if let Some(line) = &args.line {
        cfg.pipeline.counting_line = Some(parse_counting_line(line).context("invalid --line")?);
    }
    if let Some(model) = &args.model {
        cfg.detector.model_path = Some(model.clone());
    }
    Ok(())
}

fn build_detector(args: &Args, settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    if let Some(path) = &args.detections {
        return Ok(Box::new(ScriptedBackend::from_path(path)?));
    }
    let model = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("no detector configured: pass --model or --detections"))?;
    load_model(model, settings)
}

#[cfg(feature = "backend-tract")]
fn load_model(model: &std::path::Path, settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    let backend = helmet_watch::detect::TractBackend::new(
        model,
        settings.input_width,
        settings.input_height,
    )?
    .with_iou_threshold(settings.iou_threshold);
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn load_model(model: &std::path::Path, _settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    anyhow::bail!(
        "cannot load {}: model inference requires the backend-tract feature",
        model.display()
    )
}
