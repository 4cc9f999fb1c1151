//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};

/// Where job records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobStoreBackend {
    #[default]
    Memory,
    Redis,
}

impl JobStoreBackend {
    pub fn from_name(name: &str) -> WorkerResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(WorkerError::config_error(format!("unknown job store '{}'", other))),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Jobs accepted but not yet running
    pub queue_capacity: usize,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Log a warning when a job runs longer than this
    pub job_timeout_warning: Option<Duration>,
    /// Parent of the per-job scratch directories
    pub work_dir: PathBuf,
    /// Job record backend
    pub job_store: JobStoreBackend,
    /// Base URL receiving `PUT /jobs/<id>/status` callbacks
    pub status_callback_url: Option<String>,
    /// Also publish status changes on Redis `status:<id>`
    pub publish_status: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            queue_capacity: 1024,
            shutdown_timeout: Duration::from_secs(30),
            job_timeout_warning: Some(Duration::from_secs(3300)),
            work_dir: std::env::temp_dir().join("reel"),
            job_store: JobStoreBackend::Memory,
            status_callback_url: None,
            publish_status: false,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            queue_capacity: std::env::var("WORKER_QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.queue_capacity),
            shutdown_timeout: std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            // 0 disables the warning
            job_timeout_warning: match std::env::var("WORKER_JOB_TIMEOUT_WARNING").ok().and_then(|s| s.parse().ok()) {
                Some(0u64) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.job_timeout_warning,
            },
            work_dir: std::env::var("REEL_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            job_store: JobStoreBackend::from_name(&std::env::var("REEL_JOB_STORE").unwrap_or_default())?,
            status_callback_url: std::env::var("REEL_STATUS_CALLBACK_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            publish_status: std::env::var("REEL_PUBLISH_STATUS")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        })
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_max_concurrent_jobs(mut self, n: usize) -> Self {
        self.max_concurrent_jobs = n.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = n.max(1);
        self
    }
}
