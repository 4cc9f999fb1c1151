//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{error, info, warn};

use reel_models::{BatchRequest, JobId, JobUpdate};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::runner::JobRunner;
use crate::service::JobService;

/// Signals a running executor to stop admitting jobs.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.0.send(true);
    }
}

enum Exit {
    /// Every submitter is gone and the channel is empty.
    Drained,
    Shutdown,
}

async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Fixed-size pool running submitted jobs.
pub struct JobExecutor {
    config: WorkerConfig,
    runner: Arc<JobRunner>,
    jobs: mpsc::Receiver<JobId>,
    job_semaphore: Arc<Semaphore>,
    shutdown: Arc<watch::Sender<bool>>,
}

/// Create a service and the executor consuming its submissions.
pub fn job_pool(config: WorkerConfig, runner: JobRunner) -> (JobService, JobExecutor) {
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    let service = JobService::new(Arc::clone(runner.store()), tx);
    (service, JobExecutor::new(config, runner, rx))
}

/// Submit a whole batch and run it to completion.
///
/// The executor is started before the first row is queued, so a batch with
/// more rows than the queue holds drains while it is being submitted.
pub async fn run_batch(service: JobService, executor: JobExecutor, batch: BatchRequest) -> WorkerResult<Vec<JobId>> {
    let running = tokio::spawn(executor.run());

    let submitted = service.submit_batch(batch).await;
    // Dropping the last sender lets the executor exit once drained.
    drop(service);

    let ran = running
        .await
        .map_err(|e| WorkerError::ExecutorPanicked(e.to_string()))?;
    let ids = submitted?;
    ran?;
    Ok(ids)
}

impl JobExecutor {
    pub fn new(mut config: WorkerConfig, runner: JobRunner, jobs: mpsc::Receiver<JobId>) -> Self {
        config.max_concurrent_jobs = config.max_concurrent_jobs.max(1);
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            runner: Arc::new(runner),
            jobs,
            job_semaphore,
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown))
    }

    /// Run until the submission channel is drained or shutdown is signalled.
    ///
    /// On shutdown, jobs still queued are failed and in-flight jobs get up
    /// to `shutdown_timeout` to finish.
    pub async fn run(mut self) -> WorkerResult<()> {
        info!(
            "Starting job executor with {} max concurrent jobs",
            self.config.max_concurrent_jobs
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        let exit = loop {
            let permit = tokio::select! {
                biased;
                _ = stop_requested(&mut shutdown_rx) => break Exit::Shutdown,
                permit = Arc::clone(&self.job_semaphore).acquire_owned() => {
                    permit.map_err(|_| WorkerError::ExecutorClosed)?
                }
            };

            let job_id = tokio::select! {
                biased;
                _ = stop_requested(&mut shutdown_rx) => break Exit::Shutdown,
                next = self.jobs.recv() => match next {
                    Some(id) => id,
                    None => break Exit::Drained,
                },
            };

            let runner = Arc::clone(&self.runner);
            tokio::spawn(async move {
                let _permit = permit;
                match runner.run(&job_id).await {
                    Ok(status) => info!(job_id = %job_id, "Job finished: {}", status.as_str()),
                    Err(e) => error!(job_id = %job_id, "Job could not be run: {}", e),
                }
            });
        };

        if let Exit::Drained = exit {
            info!("All submitted jobs admitted, waiting for them to finish");
            tokio::select! {
                _ = self.wait_for_jobs() => {
                    info!("Job executor stopped");
                    return Ok(());
                }
                _ = stop_requested(&mut shutdown_rx) => {}
            }
        }

        info!("Shutdown signal received, stopping executor");
        self.reject_queued().await;

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            let running = self.config.max_concurrent_jobs - self.job_semaphore.available_permits();
            warn!("{} job(s) still running after {:?}", running, self.config.shutdown_timeout);
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Fail every job that was submitted but never admitted.
    async fn reject_queued(&mut self) {
        self.jobs.close();
        while let Ok(job_id) = self.jobs.try_recv() {
            let failed = self
                .runner
                .store()
                .update(&job_id, JobUpdate::fail(WorkerError::ExecutorClosed.to_string()))
                .await;
            if let Err(e) = failed {
                warn!(job_id = %job_id, "Failed to reject queued job: {}", e);
            }
        }
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{local_storage, FakeStages};
    use crate::pipeline::{EncodeProgress, MediaStages, Pipeline, ResolvedItem};
    use async_trait::async_trait;
    use reel_media::{Clip, MediaResult};
    use reel_models::{JobStatus, MediaItem, OutputSettings, SpreadsheetRow};
    use reel_queue::{JobStore, MemoryJobStore};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Records how many clips are being built at once.
    #[derive(Default)]
    struct SlowStages {
        inner: FakeStages,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl MediaStages for SlowStages {
        async fn build_clip(&self, work_dir: &Path, item: &ResolvedItem, source: &Path, fps: u32) -> MediaResult<Clip> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.inner.build_clip(work_dir, item, source, fps).await
        }

        async fn normalize(&self, clips: Vec<Clip>, resolution: Option<&str>, fps: u32) -> MediaResult<Vec<Clip>> {
            self.inner.normalize(clips, resolution, fps).await
        }

        async fn assemble(
            &self,
            clips: Vec<Clip>,
            settings: &OutputSettings,
            output: &Path,
            on_progress: EncodeProgress,
        ) -> MediaResult<PathBuf> {
            self.inner.assemble(clips, settings, output, on_progress).await
        }
    }

    fn config(max: usize) -> WorkerConfig {
        WorkerConfig::default().with_max_concurrent_jobs(max)
    }

    #[tokio::test]
    async fn test_pool_runs_every_job_within_limit() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.mp4");
        tokio::fs::write(&source, b"x").await.unwrap();

        let stages = Arc::new(SlowStages::default());
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let pipeline = Pipeline::new(local_storage(&dir.path().join("storage")), stages.clone(), dir.path().join("work"));
        let runner = JobRunner::new(Arc::clone(&store), vec![], pipeline, None);

        let (service, executor) = job_pool(config(2), runner);
        let mut ids = Vec::new();
        for _ in 0..5 {
            let items = vec![MediaItem::video(source.to_string_lossy(), 1.0, 0.0)];
            ids.push(service.submit(items, OutputSettings::default()).await.unwrap());
        }
        drop(service);

        executor.run().await.unwrap();

        for id in &ids {
            let job = store.get(id).await.unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Completed, "{:?}", job.error);
        }
        assert!(stages.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_queued_jobs() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let pipeline = Pipeline::new(
            local_storage(&dir.path().join("storage")),
            Arc::new(FakeStages::default()),
            dir.path().join("work"),
        );
        let runner = JobRunner::new(Arc::clone(&store), vec![], pipeline, None);

        let (service, executor) = job_pool(config(1), runner);
        let id = service
            .submit(vec![MediaItem::image("/none.png", 1.0)], OutputSettings::default())
            .await
            .unwrap();

        // Signalled before the executor starts: nothing is admitted.
        executor.shutdown_handle().shutdown();
        executor.run().await.unwrap();

        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("Worker pool is shut down"));

        // Submissions after the executor is gone fail immediately.
        let late = service
            .submit(vec![MediaItem::image("/none.png", 1.0)], OutputSettings::default())
            .await
            .unwrap();
        let job = store.get(&late).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_batch_larger_than_queue_completes() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.mp4");
        tokio::fs::write(&source, b"x").await.unwrap();

        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let pipeline = Pipeline::new(
            local_storage(&dir.path().join("storage")),
            Arc::new(FakeStages::default()),
            dir.path().join("work"),
        );
        let runner = JobRunner::new(Arc::clone(&store), vec![], pipeline, None);
        let (service, executor) = job_pool(config(1).with_queue_capacity(1), runner);

        let rows = (0..5)
            .map(|_| SpreadsheetRow {
                row_number: None,
                media_items: vec![MediaItem::video(source.to_string_lossy(), 1.0, 0.0)],
                output_name: None,
            })
            .collect();
        let batch = BatchRequest {
            spreadsheet_id: None,
            sheet_name: Some("Reels".into()),
            rows,
            output_settings: OutputSettings::default(),
        };

        let ids = tokio::time::timeout(Duration::from_secs(10), run_batch(service, executor, batch))
            .await
            .expect("batch should not stall on a full queue")
            .unwrap();

        assert_eq!(ids.len(), 5);
        for id in &ids {
            let job = store.get(id).await.unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Completed, "{:?}", job.error);
        }
    }
}
