//! Video registry and processing jobs.
//!
//! Records move `pending -> processing -> completed | failed`. Stores are
//! passed in by the caller; nothing here is global.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::config::StorageSettings;
use crate::ingest::VideoSource;
use crate::pipeline::{CompliancePipeline, VideoResult};
use crate::storage::RecordStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: String,
    pub filename: String,
    pub size_mb: f64,
    pub uploaded_at: u64,
    pub status: ProcessingStatus,
    pub path: PathBuf,
    pub format: String,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredResult {
    pub video_id: String,
    pub processed_at: u64,
    pub results: VideoResult,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    MissingFilename,
    InvalidFormat,
    TooLarge,
}

/// Upload refused before anything was stored.
#[derive(Clone, Debug)]
pub struct UploadRejected {
    pub reason: RejectReason,
    pub message: String,
}

impl std::fmt::Display for UploadRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "upload rejected: {}", self.message)
    }
}
impl std::error::Error for UploadRejected {}

fn reject(reason: RejectReason, message: String) -> anyhow::Error {
    UploadRejected { reason, message }.into()
}

fn new_video_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Validate an uploaded file and record it as pending.
pub fn register_video(
    videos: &mut dyn RecordStore<VideoRecord>,
    limits: &StorageSettings,
    filename: &str,
    path: &Path,
    size_bytes: u64,
) -> Result<VideoRecord> {
    if filename.trim().is_empty() {
        return Err(reject(
            RejectReason::MissingFilename,
            "no filename provided".to_string(),
        ));
    }

    let size_mb = size_bytes as f64 / (1024.0 * 1024.0);
    if size_mb > limits.max_video_size_mb {
        return Err(reject(
            RejectReason::TooLarge,
            format!(
                "file too large: {:.2}MB exceeds {}MB",
                size_mb, limits.max_video_size_mb
            ),
        ));
    }

    let format = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if !limits.allowed_formats.iter().any(|f| *f == format) {
        return Err(reject(
            RejectReason::InvalidFormat,
            format!(
                "invalid format '{}'; allowed: {}",
                format,
                limits.allowed_formats.join(", ")
            ),
        ));
    }

    let record = VideoRecord {
        id: new_video_id(),
        filename: filename.to_string(),
        size_mb,
        uploaded_at: crate::now_s()?,
        status: ProcessingStatus::Pending,
        path: path.to_path_buf(),
        format,
        started_at: None,
        completed_at: None,
        error: None,
    };
    videos.insert(&record.id, record.clone())?;
    log::info!("video registered: {} ({:.2}MB)", record.id, size_mb);
    Ok(record)
}

/// Process a registered video and store its result.
///
/// `open` turns the record into a frame source. Any failure, opening
/// included, marks the record failed with the error message and is returned.
pub fn run_job<F>(
    videos: &mut dyn RecordStore<VideoRecord>,
    results: &mut dyn RecordStore<StoredResult>,
    pipeline: &mut CompliancePipeline,
    video_id: &str,
    open: F,
) -> Result<()>
where
    F: FnOnce(&VideoRecord) -> Result<Box<dyn VideoSource>>,
{
    let record = videos
        .get(video_id)
        .cloned()
        .ok_or_else(|| anyhow!("video {} not found", video_id))?;
    if record.status == ProcessingStatus::Processing {
        bail!("video {} is already processing", video_id);
    }

    let started_at = crate::now_s()?;
    videos.update(video_id, &mut |v| {
        v.status = ProcessingStatus::Processing;
        v.started_at = Some(started_at);
        v.error = None;
    })?;
    log::info!("processing video {}", video_id);

    let outcome = open(&record)
        .and_then(|mut source| pipeline.process_video(&mut source))
        .and_then(|video_result| {
            let processed_at = crate::now_s()?;
            results.remove(video_id);
            results.insert(
                video_id,
                StoredResult {
                    video_id: video_id.to_string(),
                    processed_at,
                    results: video_result,
                },
            )?;
            Ok(processed_at)
        });

    // Anything failing above leaves the record `Failed`, never `Processing`.
    match outcome {
        Ok(processed_at) => {
            videos.update(video_id, &mut |v| {
                v.status = ProcessingStatus::Completed;
                v.completed_at = Some(processed_at);
            })?;
            log::info!("video {} completed", video_id);
            Ok(())
        }
        Err(e) => {
            let message = format!("{:#}", e);
            log::warn!("processing failed for {}: {}", video_id, message);
            videos.update(video_id, &mut |v| {
                v.status = ProcessingStatus::Failed;
                v.error = Some(message.clone());
            })?;
            Err(e)
        }
    }
}

/// Remove a video and any stored result for it.
pub fn delete_video(
    videos: &mut dyn RecordStore<VideoRecord>,
    results: &mut dyn RecordStore<StoredResult>,
    video_id: &str,
) -> Result<VideoRecord> {
    let record = videos
        .remove(video_id)
        .ok_or_else(|| anyhow!("video {} not found", video_id))?;
    results.remove(video_id);
    log::info!("video deleted: {}", video_id);
    Ok(record)
}

/// Stored result, only once processing has completed.
pub fn completed_result<'a>(
    videos: &dyn RecordStore<VideoRecord>,
    results: &'a dyn RecordStore<StoredResult>,
    video_id: &str,
) -> Result<&'a StoredResult> {
    let record = videos
        .get(video_id)
        .ok_or_else(|| anyhow!("video {} not found", video_id))?;
    if record.status != ProcessingStatus::Completed {
        bail!("results not ready for video {}", video_id);
    }
    results
        .get(video_id)
        .ok_or_else(|| anyhow!("results missing for video {}", video_id))
}
