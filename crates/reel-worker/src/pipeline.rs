//! Per-job pipeline: acquire → build → normalize → assemble → store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn, Instrument};

use reel_media::fs_utils::scratch_name;
use reel_media::{
    assemble_and_encode, detect_media_type, normalize, Clip, ClipBuilder, MediaError, MediaResult,
};
use reel_models::{Job, MediaItem, MediaType, OutputSettings};
use reel_storage::Storage;

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::progress::ProgressTracker;

/// Encoder progress callback.
pub type EncodeProgress = Box<dyn Fn(f64) + Send + 'static>;

/// The FFmpeg-backed stages, behind a seam so the orchestration can be
/// exercised without media binaries.
#[async_trait]
pub trait MediaStages: Send + Sync {
    /// Turn one local source into an intermediate clip.
    async fn build_clip(&self, work_dir: &Path, item: &ResolvedItem, source: &Path, fps: u32) -> MediaResult<Clip>;

    async fn normalize(&self, clips: Vec<Clip>, resolution: Option<&str>, fps: u32) -> MediaResult<Vec<Clip>>;

    async fn assemble(
        &self,
        clips: Vec<Clip>,
        settings: &OutputSettings,
        output: &Path,
        on_progress: EncodeProgress,
    ) -> MediaResult<PathBuf>;
}

/// Production stages driving `ffmpeg`/`ffprobe`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegStages;

#[async_trait]
impl MediaStages for FfmpegStages {
    async fn build_clip(&self, work_dir: &Path, item: &ResolvedItem, source: &Path, fps: u32) -> MediaResult<Clip> {
        let media_type = detect_media_type(source, item.media_type).await;
        debug!(index = item.index, ?media_type, "Resolved media type");
        ClipBuilder::new(work_dir, fps)
            .build(item.index, source, media_type, item.start_time, item.duration)
            .await
    }

    async fn normalize(&self, clips: Vec<Clip>, resolution: Option<&str>, fps: u32) -> MediaResult<Vec<Clip>> {
        normalize(clips, resolution, fps).await
    }

    async fn assemble(
        &self,
        clips: Vec<Clip>,
        settings: &OutputSettings,
        output: &Path,
        on_progress: EncodeProgress,
    ) -> MediaResult<PathBuf> {
        assemble_and_encode(clips, settings, output, on_progress).await
    }
}

/// A media item with its raw fields validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedItem {
    pub index: usize,
    pub source: String,
    pub media_type: MediaType,
    pub start_time: f64,
    pub duration: f64,
}

/// Validate one item's raw fields.
///
/// A missing, non-numeric or non-positive duration fails the item. A
/// malformed or negative start time is logged and treated as 0.
pub fn resolve_item(index: usize, item: &MediaItem) -> MediaResult<ResolvedItem> {
    let source = item
        .source()
        .ok_or(MediaError::MissingSource { index })?
        .to_string();

    let duration = match &item.duration {
        None => return Err(MediaError::invalid_duration(index, "Duration is required but was missing")),
        Some(raw) => raw
            .as_seconds()
            .ok_or_else(|| MediaError::invalid_duration(index, format!("{} is not a number", raw)))?,
    };
    if duration <= 0.0 {
        return Err(MediaError::invalid_duration(index, format!("{} must be greater than zero", duration)));
    }

    let start_time = match &item.start_time {
        None => 0.0,
        Some(raw) => match raw.as_seconds() {
            Some(s) if s >= 0.0 => s,
            _ => {
                let err = MediaError::InvalidStartTime {
                    index,
                    value: raw.to_string(),
                };
                warn!("{}, using 0", err);
                0.0
            }
        },
    };

    Ok(ResolvedItem {
        index,
        source,
        media_type: item.media_type,
        start_time,
        duration,
    })
}

/// Storage key of a job's output.
pub fn output_key(job: &Job) -> String {
    let name = job
        .output_name
        .as_deref()
        .map(sanitize_output_name)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string());
    format!("outputs/{}/{}.{}", job.id, name, job.output_settings.format.extension())
}

fn sanitize_output_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}

/// Runs one job end to end.
pub struct Pipeline {
    storage: Arc<dyn Storage>,
    stages: Arc<dyn MediaStages>,
    work_dir: PathBuf,
}

impl Pipeline {
    pub fn new(storage: Arc<dyn Storage>, stages: Arc<dyn MediaStages>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            stages,
            work_dir: work_dir.into(),
        }
    }

    /// Produce the job's video and return its storage reference.
    ///
    /// The scratch directory and every intermediate are removed on all paths.
    pub async fn run(&self, job: &Job, tracker: &ProgressTracker) -> WorkerResult<String> {
        let logger = JobLogger::new(&job.id, job.row_number);
        self.run_inner(job, tracker, &logger)
            .instrument(logger.create_span())
            .await
    }

    async fn run_inner(&self, job: &Job, tracker: &ProgressTracker, logger: &JobLogger) -> WorkerResult<String> {
        if job.media_items.is_empty() {
            return Err(WorkerError::EmptyMediaList);
        }

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("job_{}_", job.id))
            .tempdir_in(&self.work_dir)?;

        let settings = &job.output_settings;
        let fps = settings.effective_fps();
        let total = job.media_items.len();
        let mut clips = Vec::with_capacity(total);

        for (index, item) in job.media_items.iter().enumerate() {
            tracker.item_started(index);

            let resolved = resolve_item(index, item)?;
            logger.log_progress(&format!(
                "item {}/{}: {} ({}s from {}s)",
                index + 1,
                total,
                resolved.source,
                resolved.duration,
                resolved.start_time
            ));

            let source = self.acquire(&resolved, scratch.path()).await?;
            let clip = self
                .stages
                .build_clip(scratch.path(), &resolved, &source, fps)
                .await?;
            clips.push(clip);

            tracker.item_finished(index);
        }

        tracker.normalizing();
        let clips = self
            .stages
            .normalize(clips, settings.resolution.as_deref(), fps)
            .await?;
        tracker.normalized();

        tracker.concatenating();
        let rendered = scratch.path().join(format!("output.{}", settings.format.extension()));
        tracker.encoding_started();
        let encode_tracker = tracker.clone();
        let rendered = self
            .stages
            .assemble(clips, settings, &rendered, Box::new(move |f| encode_tracker.encoding(f)))
            .await?;

        let key = output_key(job);
        let reference = self.storage.save_file(&key, &rendered).await?;
        logger.log_progress(&format!("stored output at {}", reference));

        Ok(reference)
    }

    /// Get a local file for an item: download, resolve a storage reference,
    /// or use a local path as-is.
    async fn acquire(&self, item: &ResolvedItem, scratch: &Path) -> WorkerResult<PathBuf> {
        let source = item.source.as_str();
        if source.starts_with("http://") || source.starts_with("https://") {
            let destination = scratch.join(scratch_name(source, item.index));
            return Ok(self.storage.fetch_remote(source, &destination).await?);
        }
        if self.storage.is_reference(source) {
            return Ok(self.storage.resolve(source, scratch).await?);
        }

        let path = PathBuf::from(source);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(MediaError::SourceNotFound(path).into());
        }
        Ok(path)
    }
}
