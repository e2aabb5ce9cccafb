use std::path::Path;

use anyhow::anyhow;
use image::{Rgb, RgbImage};

use helmet_watch::config::StorageSettings;
use helmet_watch::jobs::{
    completed_result, delete_video, register_video, run_job, ProcessingStatus, RejectReason,
    StoredResult, UploadRejected, VideoRecord,
};
use helmet_watch::storage::{InMemoryStore, RecordStore};
use helmet_watch::{
    CompliancePipeline, MemorySource, PipelineConfig, ScriptedBackend, VideoIoError, VideoSource,
};

fn stores() -> (InMemoryStore<VideoRecord>, InMemoryStore<StoredResult>) {
    (InMemoryStore::new(), InMemoryStore::new())
}

fn pipeline() -> CompliancePipeline {
    CompliancePipeline::new(PipelineConfig::default(), Box::new(ScriptedBackend::new())).unwrap()
}

fn gray_clip() -> Box<dyn VideoSource> {
    let frames = vec![RgbImage::from_pixel(64, 48, Rgb([128, 128, 128])); 3];
    Box::new(MemorySource::new(30.0, frames))
}

fn rejection(err: &anyhow::Error) -> RejectReason {
    err.downcast_ref::<UploadRejected>()
        .expect("upload rejection")
        .reason
}

#[test]
fn register_validates_format_and_size() {
    let (mut videos, _) = stores();
    let limits = StorageSettings::default();

    let err = register_video(&mut videos, &limits, "clip.webm", Path::new("/tmp/clip.webm"), 10)
        .unwrap_err();
    assert_eq!(rejection(&err), RejectReason::InvalidFormat);

    let err = register_video(
        &mut videos,
        &limits,
        "big.mp4",
        Path::new("/tmp/big.mp4"),
        101 * 1024 * 1024,
    )
    .unwrap_err();
    assert_eq!(rejection(&err), RejectReason::TooLarge);

    let err = register_video(&mut videos, &limits, "", Path::new("/tmp/x.mp4"), 10).unwrap_err();
    assert_eq!(rejection(&err), RejectReason::MissingFilename);

    assert!(videos.is_empty());

    let record = register_video(
        &mut videos,
        &limits,
        "Clip.MP4",
        Path::new("/tmp/clip.mp4"),
        5 * 1024 * 1024,
    )
    .unwrap();
    assert_eq!(record.status, ProcessingStatus::Pending);
    assert_eq!(record.format, "mp4");
    assert_eq!(record.size_mb, 5.0);
    assert_eq!(record.id.len(), 32);
    assert_eq!(videos.get(&record.id), Some(&record));
}

#[test]
fn successful_job_stores_result() {
    let (mut videos, mut results) = stores();
    let record = register_video(
        &mut videos,
        &StorageSettings::default(),
        "clip.mp4",
        Path::new("/tmp/clip.mp4"),
        1024,
    )
    .unwrap();

    assert!(completed_result(&videos, &results, &record.id).is_err());

    let mut pipeline = pipeline();
    run_job(&mut videos, &mut results, &mut pipeline, &record.id, |_| Ok(gray_clip())).unwrap();

    let stored = videos.get(&record.id).unwrap();
    assert_eq!(stored.status, ProcessingStatus::Completed);
    assert!(stored.started_at.is_some());
    assert!(stored.completed_at.is_some());
    assert!(stored.error.is_none());

    let result = completed_result(&videos, &results, &record.id).unwrap();
    assert_eq!(result.video_id, record.id);
    assert_eq!(result.results.processed_frames, 3);
}

#[test]
fn failed_open_marks_record_failed() {
    let (mut videos, mut results) = stores();
    let record = register_video(
        &mut videos,
        &StorageSettings::default(),
        "clip.avi",
        Path::new("/missing/clip.avi"),
        1024,
    )
    .unwrap();

    let mut pipeline = pipeline();
    let err = run_job(&mut videos, &mut results, &mut pipeline, &record.id, |r| {
        Err(VideoIoError::open(&r.path.display().to_string(), "no such file").into())
    })
    .unwrap_err();
    assert!(err.downcast_ref::<VideoIoError>().is_some());

    let stored = videos.get(&record.id).unwrap();
    assert_eq!(stored.status, ProcessingStatus::Failed);
    assert!(stored.error.as_deref().unwrap().contains("no such file"));
    assert!(results.is_empty());
}

#[test]
fn unreadable_frame_fails_the_job() {
    struct Truncated;

    impl VideoSource for Truncated {
        fn info(&self) -> helmet_watch::VideoInfo {
            helmet_watch::VideoInfo {
                fps: 25.0,
                total_frames: 100,
                width: 64,
                height: 48,
            }
        }

        fn next_frame(&mut self) -> anyhow::Result<Option<RgbImage>> {
            Err(anyhow!("corrupt packet"))
        }
    }

    let (mut videos, mut results) = stores();
    let record = register_video(
        &mut videos,
        &StorageSettings::default(),
        "clip.mkv",
        Path::new("/tmp/clip.mkv"),
        1024,
    )
    .unwrap();

    let mut pipeline = pipeline();
    let err = run_job(&mut videos, &mut results, &mut pipeline, &record.id, |_| {
        Ok(Box::new(Truncated) as Box<dyn VideoSource>)
    })
    .unwrap_err();
    assert!(err.downcast_ref::<VideoIoError>().is_some());
    assert_eq!(
        videos.get(&record.id).unwrap().status,
        ProcessingStatus::Failed
    );
}

#[test]
fn delete_removes_record_and_result() {
    let (mut videos, mut results) = stores();
    let record = register_video(
        &mut videos,
        &StorageSettings::default(),
        "clip.mov",
        Path::new("/tmp/clip.mov"),
        1024,
    )
    .unwrap();
    let mut pipeline = pipeline();
    run_job(&mut videos, &mut results, &mut pipeline, &record.id, |_| Ok(gray_clip())).unwrap();
    assert_eq!(results.len(), 1);

    let removed = delete_video(&mut videos, &mut results, &record.id).unwrap();
    assert_eq!(removed.id, record.id);
    assert!(videos.get(&record.id).is_none());
    assert!(results.is_empty());
    assert!(delete_video(&mut videos, &mut results, &record.id).is_err());
}

#[test]
fn unknown_video_cannot_run() {
    let (mut videos, mut results) = stores();
    let mut pipeline = pipeline();
    assert!(run_job(&mut videos, &mut results, &mut pipeline, "nope", |_| Ok(gray_clip())).is_err());
}

/// Result store that refuses every write.
struct ReadOnlyResults(InMemoryStore<StoredResult>);

impl RecordStore<StoredResult> for ReadOnlyResults {
    fn insert(&mut self, id: &str, _value: StoredResult) -> anyhow::Result<()> {
        Err(anyhow!("result store is read-only, cannot save {}", id))
    }

    fn get(&self, id: &str) -> Option<&StoredResult> {
        self.0.get(id)
    }

    fn update(&mut self, id: &str, f: &mut dyn FnMut(&mut StoredResult)) -> anyhow::Result<()> {
        self.0.update(id, f)
    }

    fn remove(&mut self, id: &str) -> Option<StoredResult> {
        self.0.remove(id)
    }

    fn list(&self, skip: usize, limit: usize) -> Vec<&StoredResult> {
        self.0.list(skip, limit)
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

#[test]
fn failure_after_processing_leaves_record_retryable() {
    let (mut videos, results) = stores();
    let record = register_video(
        &mut videos,
        &StorageSettings::default(),
        "clip.mp4",
        Path::new("/tmp/clip.mp4"),
        1024,
    )
    .unwrap();

    let mut pipeline = pipeline();
    let mut read_only = ReadOnlyResults(InMemoryStore::new());
    let err = run_job(&mut videos, &mut read_only, &mut pipeline, &record.id, |_| {
        Ok(gray_clip())
    })
    .unwrap_err();
    assert!(err.to_string().contains("read-only"));

    let stored = videos.get(&record.id).unwrap();
    assert_eq!(stored.status, ProcessingStatus::Failed);
    assert!(stored.completed_at.is_none());

    let mut results = results;
    run_job(&mut videos, &mut results, &mut pipeline, &record.id, |_| Ok(gray_clip())).unwrap();
    assert_eq!(
        videos.get(&record.id).unwrap().status,
        ProcessingStatus::Completed
    );
}
