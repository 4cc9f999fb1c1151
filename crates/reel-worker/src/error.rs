//! Worker error types.

use reel_models::JobId;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors surfaced by the worker.
///
/// Media and storage failures are transparent so a failed job's error text
/// is the stage's own message.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("No media items provided")]
    EmptyMediaList,

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Worker pool is shut down")]
    ExecutorClosed,

    #[error("Executor task failed: {0}")]
    ExecutorPanicked(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Media(#[from] reel_media::MediaError),

    #[error(transparent)]
    Storage(#[from] reel_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] reel_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether the failure came from acquiring inputs.
    pub fn is_download_failure(&self) -> bool {
        match self {
            WorkerError::Media(e) => e.is_download_failure(),
            WorkerError::Storage(reel_storage::StorageError::Media(e)) => e.is_download_failure(),
            _ => false,
        }
    }
}
