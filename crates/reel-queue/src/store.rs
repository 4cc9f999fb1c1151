//! Job record storage.

use std::collections::HashMap;

use async_trait::async_trait;
use reel_models::{Job, JobId, JobUpdate};
use tokio::sync::RwLock;

use crate::error::{QueueError, QueueResult};

/// Where job records live.
///
/// `update` is the only way the pipeline mutates a record; it applies the
/// transition rules and returns the stored result.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, job_id: &JobId) -> QueueResult<Option<Job>>;

    async fn put(&self, job: Job) -> QueueResult<()>;

    async fn update(&self, job_id: &JobId, update: JobUpdate) -> QueueResult<Job>;
}

/// In-process job table.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get(&self, job_id: &JobId) -> QueueResult<Option<Job>> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn put(&self, job: Job) -> QueueResult<()> {
        self.jobs.write().await.insert(job.id.clone(), job);
        Ok(())
    }

    async fn update(&self, job_id: &JobId, update: JobUpdate) -> QueueResult<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| QueueError::JobNotFound(job_id.clone()))?;
        job.apply(update)?;
        Ok(job.clone())
    }
}
