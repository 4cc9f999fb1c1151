//! Per-job status updater task.
//!
//! The pipeline never awaits storage or sinks directly. Updates go through
//! an unbounded channel to one task per job, which applies them to the
//! `JobStore` in order and then fans the stored status out to every sink.
//! Sink failures are logged and dropped.

use std::sync::Arc;

use reel_models::{Job, JobId, JobUpdate};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::sink::StatusSink;
use crate::store::JobStore;

/// Cheap handle for emitting updates about one job.
#[derive(Debug, Clone)]
pub struct StatusSender {
    job_id: JobId,
    tx: mpsc::UnboundedSender<JobUpdate>,
}

impl StatusSender {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Queue an update. Never blocks; dropped if the updater is gone.
    pub fn send(&self, update: JobUpdate) {
        if self.tx.send(update).is_err() {
            debug!(job_id = %self.job_id, "Status updater closed, dropping update");
        }
    }
}

/// Owns the delivery task for one job.
pub struct StatusUpdater {
    sender: StatusSender,
    handle: JoinHandle<Option<Job>>,
}

impl StatusUpdater {
    pub fn spawn(job_id: JobId, store: Arc<dyn JobStore>, sinks: Vec<Arc<dyn StatusSink>>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<JobUpdate>();
        let task_job_id = job_id.clone();

        let handle = tokio::spawn(async move {
            let mut last = None;
            while let Some(update) = rx.recv().await {
                let job = match store.update(&task_job_id, update).await {
                    Ok(job) => job,
                    Err(e) => {
                        warn!(job_id = %task_job_id, "Status update rejected: {}", e);
                        continue;
                    }
                };

                let view = job.status_view();
                for sink in &sinks {
                    if let Err(e) = sink.deliver(&view).await {
                        warn!(job_id = %task_job_id, "Status delivery failed: {}", e);
                    }
                }
                last = Some(job);
            }
            last
        });

        Self {
            sender: StatusSender { job_id, tx },
            handle,
        }
    }

    pub fn sender(&self) -> StatusSender {
        self.sender.clone()
    }

    /// Close the channel and wait until every queued update is stored.
    ///
    /// Returns the last stored record. Any `StatusSender` clones still alive
    /// keep the task running, so drop them first.
    pub async fn finish(self) -> Option<Job> {
        drop(self.sender);
        match self.handle.await {
            Ok(job) => job,
            Err(e) => {
                warn!("Status updater task failed: {}", e);
                None
            }
        }
    }
}
