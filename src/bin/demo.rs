//! demo - end-to-end run on a generated clip
//!
//! Builds a ten-frame clip where one rider in a red helmet passes on a
//! motorcycle in frames 3-7, registers it as an upload, processes it as a job
//! with replayed detections and prints the stored result.

use anyhow::Result;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use std::io::IsTerminal;
use std::path::Path;

use helmet_watch::config::StorageSettings;
use helmet_watch::jobs::{self, StoredResult, VideoRecord};
use helmet_watch::storage::{InMemoryStore, RecordStore};
use helmet_watch::{
    BBox, CompliancePipeline, CountingLine, Detection, MemorySource, PipelineConfig, Point,
    ScriptedBackend, VideoSource,
};

#[path = "../ui.rs"]
mod ui;

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;
const FRAMES: u64 = 10;
const RIDER_FRAMES: std::ops::RangeInclusive<u64> = 3..=7;

fn rider_box(frame: u64) -> BBox {
    let x = 20.0 * frame as f32;
    BBox::new(x + 20.0, 40.0, x + 80.0, 200.0)
}

fn motorcycle_box(frame: u64) -> BBox {
    let x = 20.0 * frame as f32;
    BBox::new(x, 120.0, x + 120.0, 230.0)
}

fn clip() -> Vec<RgbImage> {
    (1..=FRAMES)
        .map(|n| {
            let mut frame = RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([128, 128, 128]));
            if RIDER_FRAMES.contains(&n) {
                let head = rider_box(n);
                draw_filled_rect_mut(
                    &mut frame,
                    Rect::at(head.x1 as i32, head.y1 as i32).of_size(60, 40),
                    Rgb([210, 20, 20]),
                );
            }
            frame
        })
        .collect()
}

fn detections() -> ScriptedBackend {
    RIDER_FRAMES.fold(ScriptedBackend::new(), |backend, n| {
        backend.with_frame(
            n,
            vec![
                Detection::motorcycle(0.88, motorcycle_box(n)),
                Detection::person(0.81, rider_box(n)),
            ],
        )
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let ui = ui::Ui::from_args(None, std::io::stderr().is_terminal(), false);

    let mut videos: InMemoryStore<VideoRecord> = InMemoryStore::new();
    let mut results: InMemoryStore<StoredResult> = InMemoryStore::new();

    let record = {
        let _stage = ui.stage("Register upload");
        jobs::register_video(
            &mut videos,
            &StorageSettings::default(),
            "demo_clip.mp4",
            Path::new("memory://demo_clip"),
            3 * 1024 * 1024,
        )?
    };

    let config = PipelineConfig {
        confidence_threshold: 0.5,
        counting_line: Some(CountingLine {
            start: Point::new(160.0, 0.0),
            end: Point::new(160.0, 240.0),
        }),
        ..PipelineConfig::default()
    };
    let mut pipeline = CompliancePipeline::new(config, Box::new(detections()))?;

    {
        let _stage = ui.stage("Process video");
        jobs::run_job(&mut videos, &mut results, &mut pipeline, &record.id, |_| {
            let source = ui.track_frames(MemorySource::new(10.0, clip()));
            Ok(Box::new(source) as Box<dyn VideoSource>)
        })?;
    }

    let stored = jobs::completed_result(&videos, &results, &record.id)?;
    println!("{}", serde_json::to_string_pretty(&stored.results.summary)?);
    println!(
        "status={:?} worn={} missing={} compliance={:.2}%",
        videos.get(&record.id).map(|v| v.status),
        stored.results.helmets_worn,
        stored.results.helmets_not_worn,
        stored.results.compliance_rate
    );

    jobs::delete_video(&mut videos, &mut results, &record.id)?;
    println!("registry now holds {} videos", videos.len());
    Ok(())
}
