//! Job submission and status queries.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use reel_models::{BatchRequest, Job, JobId, JobStatusView, JobUpdate, MediaItem, OutputSettings};
use reel_queue::JobStore;

use crate::error::{WorkerError, WorkerResult};

/// Front door of the pipeline: stores jobs and hands them to the executor.
#[derive(Clone)]
pub struct JobService {
    store: Arc<dyn JobStore>,
    jobs: mpsc::Sender<JobId>,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>, jobs: mpsc::Sender<JobId>) -> Self {
        Self { store, jobs }
    }

    /// Submit a single-row job.
    pub async fn submit(&self, media_items: Vec<MediaItem>, output_settings: OutputSettings) -> WorkerResult<JobId> {
        self.enqueue(Job::new(1, media_items, output_settings)).await
    }

    /// Submit one job per spreadsheet row, in row order.
    pub async fn submit_batch(&self, batch: BatchRequest) -> WorkerResult<Vec<JobId>> {
        let sheet = batch.sheet_name.clone().unwrap_or_default();
        let jobs = batch.into_jobs();
        info!(sheet = %sheet, rows = jobs.len(), "Submitting batch");

        let mut ids = Vec::with_capacity(jobs.len());
        for job in jobs {
            ids.push(self.enqueue(job).await?);
        }
        Ok(ids)
    }

    /// Current status of a job, if it exists.
    pub async fn get_status(&self, job_id: &JobId) -> WorkerResult<Option<JobStatusView>> {
        Ok(self.store.get(job_id).await?.map(|job| job.status_view()))
    }

    /// Store the job as pending and queue it.
    ///
    /// If the executor is gone the job is failed rather than left pending;
    /// the id is still returned so the caller can read that status.
    async fn enqueue(&self, job: Job) -> WorkerResult<JobId> {
        let job_id = job.id.clone();
        let row = job.row_number;
        self.store.put(job).await?;

        if self.jobs.send(job_id.clone()).await.is_err() {
            warn!(job_id = %job_id, row, "Executor unavailable, failing job");
            self.store
                .update(&job_id, JobUpdate::fail(WorkerError::ExecutorClosed.to_string()))
                .await?;
        } else {
            info!(job_id = %job_id, row, "Job submitted");
        }

        Ok(job_id)
    }
}
