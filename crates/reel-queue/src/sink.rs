//! Out-of-process status delivery.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use reel_models::{JobId, JobStatus, JobStatusView};
use serde::Serialize;
use tracing::debug;

use crate::error::{QueueError, QueueResult};

/// Receives every stored status change of a job.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn deliver(&self, status: &JobStatusView) -> QueueResult<()>;
}

/// Body of a status callback.
#[derive(Debug, Serialize)]
struct StatusPayload<'a> {
    status: JobStatus,
    progress: u8,
    message: Option<&'a str>,
    output_url: Option<&'a str>,
    error: Option<&'a str>,
}

impl<'a> From<&'a JobStatusView> for StatusPayload<'a> {
    fn from(view: &'a JobStatusView) -> Self {
        Self {
            status: view.status,
            progress: view.progress,
            message: view.message.as_deref(),
            output_url: view.output_ref.as_deref(),
            error: view.error.as_deref(),
        }
    }
}

/// PUTs each status to `<base_url>/jobs/<id>/status`.
#[derive(Debug, Clone)]
pub struct HttpStatusSink {
    http: reqwest::Client,
    base_url: String,
}

impl HttpStatusSink {
    pub fn new(base_url: impl Into<String>) -> QueueResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self, job_id: &JobId) -> String {
        format!("{}/jobs/{}/status", self.base_url, job_id)
    }
}

#[async_trait]
impl StatusSink for HttpStatusSink {
    async fn deliver(&self, status: &JobStatusView) -> QueueResult<()> {
        let url = self.endpoint(&status.job_id);
        self.http
            .put(&url)
            .json(&StatusPayload::from(status))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| QueueError::delivery(format!("{}: {}", url, e)))?;
        debug!(job_id = %status.job_id, progress = status.progress, "Delivered status callback");
        Ok(())
    }
}

/// Publishes each status as JSON on `status:<id>`.
pub struct RedisStatusSink {
    client: redis::Client,
}

impl RedisStatusSink {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Get the channel name for a job.
    pub fn channel_name(job_id: &JobId) -> String {
        format!("status:{}", job_id)
    }
}

#[async_trait]
impl StatusSink for RedisStatusSink {
    async fn deliver(&self, status: &JobStatusView) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::channel_name(&status.job_id);
        let payload = serde_json::to_string(status)?;

        debug!("Publishing status to {}", channel);
        conn.publish::<_, _, ()>(channel, payload).await?;
        Ok(())
    }
}
