//! Structured job logging.

use tracing::{error, info, warn, Span};
use reel_models::JobId;

/// Lifecycle logger carrying the job id and spreadsheet row on every line.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    row: u32,
}

impl JobLogger {
    pub fn new(job_id: &JobId, row: u32) -> Self {
        Self {
            job_id: job_id.to_string(),
            row,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, row = self.row, "Job started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(job_id = %self.job_id, row = self.row, "Job progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, row = self.row, "Job warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, row = self.row, "Job error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, row = self.row, "Job completed: {}", message);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn row(&self) -> u32 {
        self.row
    }

    /// Span wrapping everything the job does.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, row = self.row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_fields() {
        let job_id = JobId::from_string("job-42");
        let logger = JobLogger::new(&job_id, 7);

        assert_eq!(logger.job_id(), "job-42");
        assert_eq!(logger.row(), 7);
    }
}
