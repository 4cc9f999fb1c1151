//! Jobs and the job state machine.
//!
//! A job is one spreadsheet row on its way to one output video. Its record
//! only changes through [`Job::apply`], which enforces the lifecycle
//! `pending -> processing -> {completed, failed}`.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::{MediaItem, OutputSettings};

/// Highest progress value reported before the job actually completes.
pub const MAX_IN_FLIGHT_PROGRESS: u8 = 99;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted, waiting for a worker
    #[default]
    Pending,
    /// A worker is running the pipeline
    Processing,
    /// Output written and stored
    Completed,
    /// Pipeline raised an error
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates accepted).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type for job state transitions.
pub type JobResult<T> = Result<T, JobError>;

/// Rejected job transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("Invalid job transition for {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
}

/// A single mutation emitted by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobUpdate {
    /// Worker picked the job up.
    Start { message: String },
    /// Weighted progress in percent plus a human-readable step.
    Progress { progress: u8, message: String },
    /// Output stored under `output_ref`.
    Complete { output_ref: String, message: String },
    /// Pipeline failed with `error`.
    Fail { error: String },
}

impl JobUpdate {
    pub fn progress(progress: u8, message: impl Into<String>) -> Self {
        Self::Progress {
            progress,
            message: message.into(),
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self::Fail { error: error.into() }
    }

    /// Status the job ends up in after this update.
    fn target(&self) -> JobStatus {
        match self {
            JobUpdate::Start { .. } | JobUpdate::Progress { .. } => JobStatus::Processing,
            JobUpdate::Complete { .. } => JobStatus::Completed,
            JobUpdate::Fail { .. } => JobStatus::Failed,
        }
    }
}

/// One row's job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Spreadsheet row this job renders
    pub row_number: u32,

    /// Preferred output file name (without extension)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,

    /// Ordered media items
    pub media_items: Vec<MediaItem>,

    /// Output settings
    pub output_settings: OutputSettings,

    /// Lifecycle status
    #[serde(default)]
    pub status: JobStatus,

    /// Weighted progress (0-100)
    #[serde(default)]
    pub progress: u8,

    /// Current step description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Storage reference of the finished video
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,

    /// Error text when failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a pending job.
    pub fn new(row_number: u32, media_items: Vec<MediaItem>, output_settings: OutputSettings) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            row_number,
            output_name: None,
            media_items,
            output_settings,
            status: JobStatus::Pending,
            progress: 0,
            message: Some("Job queued for processing".to_string()),
            output_ref: None,
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Set the preferred output file name.
    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a pipeline update, enforcing the lifecycle.
    ///
    /// On error the record is left untouched.
    pub fn apply(&mut self, update: JobUpdate) -> JobResult<()> {
        let allowed = matches!(
            (self.status, &update),
            (JobStatus::Pending, JobUpdate::Start { .. })
                | (JobStatus::Pending, JobUpdate::Fail { .. })
                | (JobStatus::Processing, JobUpdate::Progress { .. })
                | (JobStatus::Processing, JobUpdate::Complete { .. })
                | (JobStatus::Processing, JobUpdate::Fail { .. })
        );
        if !allowed {
            return Err(JobError::InvalidTransition {
                job_id: self.id.clone(),
                from: self.status,
                to: update.target(),
            });
        }

        let now = Utc::now();
        match update {
            JobUpdate::Start { message } => {
                self.status = JobStatus::Processing;
                self.message = Some(message);
                self.started_at = Some(now);
            }
            JobUpdate::Progress { progress, message } => {
                // Never goes backwards, never claims 100 before completion.
                self.progress = self.progress.max(progress.min(MAX_IN_FLIGHT_PROGRESS));
                self.message = Some(message);
            }
            JobUpdate::Complete { output_ref, message } => {
                self.status = JobStatus::Completed;
                self.progress = 100;
                self.message = Some(message);
                self.output_ref = Some(output_ref);
                self.completed_at = Some(now);
            }
            JobUpdate::Fail { error } => {
                self.status = JobStatus::Failed;
                self.message = Some("Video processing failed".to_string());
                self.error = Some(error);
                self.completed_at = Some(now);
            }
        }
        self.updated_at = now;
        Ok(())
    }

    /// Snapshot for pollers.
    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            message: self.message.clone(),
            output_ref: self.output_ref.clone(),
            error: self.error.clone(),
        }
    }
}

/// What a polling client sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "output_url")]
    pub output_ref: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(1, vec![MediaItem::video("https://example.com/a.mp4", 3.0, 0.0)], OutputSettings::default())
    }

    #[test]
    fn test_happy_path() {
        let mut job = job();
        assert_eq!(job.status, JobStatus::Pending);

        job.apply(JobUpdate::Start { message: "Starting".into() }).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.started_at.is_some());

        job.apply(JobUpdate::progress(40, "Processed file 1/1")).unwrap();
        assert_eq!(job.progress, 40);

        job.apply(JobUpdate::Complete {
            output_ref: "/storage/outputs/x/output.mp4".into(),
            message: "Done".into(),
        })
        .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_progress_is_monotonic_and_capped() {
        let mut job = job();
        job.apply(JobUpdate::Start { message: "Starting".into() }).unwrap();

        job.apply(JobUpdate::progress(60, "a")).unwrap();
        job.apply(JobUpdate::progress(20, "b")).unwrap();
        assert_eq!(job.progress, 60);
        assert_eq!(job.message.as_deref(), Some("b"));

        job.apply(JobUpdate::progress(100, "c")).unwrap();
        assert_eq!(job.progress, MAX_IN_FLIGHT_PROGRESS);
    }

    #[test]
    fn test_failure_freezes_progress() {
        let mut job = job();
        job.apply(JobUpdate::Start { message: "Starting".into() }).unwrap();
        job.apply(JobUpdate::progress(13, "x")).unwrap();
        job.apply(JobUpdate::fail("Duration is required")).unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 13);
        assert_eq!(job.error.as_deref(), Some("Duration is required"));
    }

    #[test]
    fn test_terminal_state_is_immutable() {
        let mut job = job();
        job.apply(JobUpdate::Start { message: "Starting".into() }).unwrap();
        job.apply(JobUpdate::fail("boom")).unwrap();
        let snapshot = job.clone();

        let err = job.apply(JobUpdate::progress(50, "late")).unwrap_err();
        assert!(matches!(err, JobError::InvalidTransition { from: JobStatus::Failed, .. }));
        assert!(job
            .apply(JobUpdate::Complete { output_ref: "x".into(), message: "x".into() })
            .is_err());
        assert!(job.apply(JobUpdate::fail("again")).is_err());
        assert_eq!(job, snapshot);
    }

    #[test]
    fn test_processing_entered_once() {
        let mut job = job();
        job.apply(JobUpdate::Start { message: "Starting".into() }).unwrap();
        assert!(job.apply(JobUpdate::Start { message: "again".into() }).is_err());
    }

    #[test]
    fn test_pending_rejects_progress() {
        let mut job = job();
        assert!(job.apply(JobUpdate::progress(10, "x")).is_err());
        assert_eq!(job.progress, 0);
    }

    #[test]
    fn test_status_view_serializes_output_url() {
        let mut job = job();
        job.apply(JobUpdate::Start { message: "Starting".into() }).unwrap();
        job.apply(JobUpdate::Complete { output_ref: "s3://b/k".into(), message: "Done".into() })
            .unwrap();

        let json = serde_json::to_value(job.status_view()).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["output_url"], "s3://b/k");
        assert_eq!(json["progress"], 100);
    }
}
