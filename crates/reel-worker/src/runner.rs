//! Runs one job through the pipeline and records its lifecycle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reel_models::{JobId, JobStatus, JobUpdate};
use reel_queue::{JobStore, StatusSink, StatusUpdater};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::pipeline::Pipeline;
use crate::progress::ProgressTracker;

const START_MESSAGE: &str = "Processing video";
const COMPLETE_MESSAGE: &str = "Video processing completed successfully";

/// Drives a stored job from `pending` to a terminal state.
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    sinks: Vec<Arc<dyn StatusSink>>,
    pipeline: Pipeline,
    job_timeout_warning: Option<Duration>,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        sinks: Vec<Arc<dyn StatusSink>>,
        pipeline: Pipeline,
        job_timeout_warning: Option<Duration>,
    ) -> Self {
        Self {
            store,
            sinks,
            pipeline,
            job_timeout_warning,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Run the job and return the status it ended in.
    ///
    /// Pipeline errors fail the job rather than this call; only a missing
    /// record is returned as an error.
    pub async fn run(&self, job_id: &JobId) -> WorkerResult<JobStatus> {
        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| WorkerError::JobNotFound(job_id.clone()))?;

        if job.is_terminal() {
            return Ok(job.status);
        }

        let logger = JobLogger::new(&job.id, job.row_number);
        let updater = StatusUpdater::spawn(job.id.clone(), Arc::clone(&self.store), self.sinks.clone());
        let sender = updater.sender();

        sender.send(JobUpdate::Start {
            message: START_MESSAGE.to_string(),
        });
        logger.log_start(&format!("{} media item(s)", job.media_items.len()));

        let tracker = ProgressTracker::new(job.media_items.len(), Arc::new(sender.clone()));
        let started = Instant::now();

        let result = {
            let work = self.pipeline.run(&job, &tracker);
            tokio::pin!(work);
            match self.job_timeout_warning {
                Some(limit) => {
                    tokio::select! {
                        result = &mut work => result,
                        _ = tokio::time::sleep(limit) => {
                            logger.log_warning(&format!(
                                "still running after {}s, continuing",
                                limit.as_secs()
                            ));
                            work.await
                        }
                    }
                }
                None => work.await,
            }
        };

        let status = match result {
            Ok(output_ref) => {
                logger.log_completion(&format!(
                    "{} in {:.1}s",
                    output_ref,
                    started.elapsed().as_secs_f64()
                ));
                sender.send(JobUpdate::Complete {
                    output_ref,
                    message: COMPLETE_MESSAGE.to_string(),
                });
                JobStatus::Completed
            }
            Err(e) => {
                if e.is_download_failure() {
                    logger.log_error(&format!("input acquisition failed: {}", e));
                } else {
                    logger.log_error(&e.to_string());
                }
                sender.send(JobUpdate::fail(e.to_string()));
                JobStatus::Failed
            }
        };

        drop(tracker);
        drop(sender);
        let stored = updater.finish().await;

        metrics::counter!("reel_jobs_total", "status" => status.as_str()).increment(1);
        Ok(stored.map(|j| j.status).unwrap_or(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{local_storage, FakeStages};
    use reel_models::{Job, MediaItem, OutputSettings};
    use reel_queue::MemoryJobStore;
    use tempfile::TempDir;

    fn runner(dir: &TempDir, store: Arc<dyn JobStore>) -> JobRunner {
        let pipeline = Pipeline::new(
            local_storage(&dir.path().join("storage")),
            Arc::new(FakeStages::default()),
            dir.path().join("work"),
        );
        JobRunner::new(store, vec![], pipeline, Some(Duration::from_secs(3600)))
    }

    #[tokio::test]
    async fn test_successful_job_completes_at_100() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.mp4");
        tokio::fs::write(&source, b"x").await.unwrap();

        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let job = Job::new(1, vec![MediaItem::video(source.to_string_lossy(), 1.0, 0.0)], OutputSettings::default());
        let id = job.id.clone();
        store.put(job).await.unwrap();

        let status = runner(&dir, store.clone()).run(&id).await.unwrap();
        assert_eq!(status, JobStatus::Completed);

        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.progress, 100);
        assert_eq!(stored.message.as_deref(), Some(COMPLETE_MESSAGE));
        assert!(stored.output_ref.unwrap().ends_with("/output.mp4"));
    }

    #[tokio::test]
    async fn test_failed_job_keeps_error_text() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let mut item = MediaItem::video("/nowhere/a.mp4", 1.0, 0.0);
        item.duration = None;
        let job = Job::new(2, vec![item], OutputSettings::default());
        let id = job.id.clone();
        store.put(job).await.unwrap();

        let status = runner(&dir, store.clone()).run(&id).await.unwrap();
        assert_eq!(status, JobStatus::Failed);

        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(
            stored.error.as_deref(),
            Some("Invalid duration for media item 0: Duration is required but was missing")
        );
        assert!(stored.output_ref.is_none());
    }

    #[tokio::test]
    async fn test_empty_job_fails() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let job = Job::new(1, vec![], OutputSettings::default());
        let id = job.id.clone();
        store.put(job).await.unwrap();

        runner(&dir, store.clone()).run(&id).await.unwrap();
        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("No media items provided"));
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let err = runner(&dir, store).run(&JobId::new()).await.unwrap_err();
        assert!(matches!(err, WorkerError::JobNotFound(_)));
    }
}
