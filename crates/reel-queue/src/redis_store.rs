//! Redis-backed job records.

use async_trait::async_trait;
use redis::AsyncCommands;
use reel_models::{Job, JobId, JobUpdate};
use tracing::debug;

use crate::error::{QueueError, QueueResult};
use crate::store::JobStore;

/// Redis connection settings.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// Prefix for job record keys
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "reel:job:".to_string(),
        }
    }
}

impl RedisConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("REDIS_URL").unwrap_or(defaults.url),
            key_prefix: std::env::var("REEL_JOB_KEY_PREFIX").unwrap_or(defaults.key_prefix),
        }
    }
}

/// Job records stored as JSON strings.
///
/// Each job is mutated by a single status updater, so updates are plain
/// read-apply-write without optimistic locking.
pub struct RedisJobStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisJobStore {
    pub fn new(config: &RedisConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        Ok(Self {
            client,
            key_prefix: config.key_prefix.clone(),
        })
    }

    pub fn key(&self, job_id: &JobId) -> String {
        format!("{}{}", self.key_prefix, job_id)
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn get(&self, job_id: &JobId) -> QueueResult<Option<Job>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(self.key(job_id)).await?;
        raw.map(|s| serde_json::from_str(&s).map_err(QueueError::from))
            .transpose()
    }

    async fn put(&self, job: Job) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(&job)?;
        conn.set::<_, _, ()>(self.key(&job.id), payload).await?;
        debug!(job_id = %job.id, "Stored job record");
        Ok(())
    }

    async fn update(&self, job_id: &JobId, update: JobUpdate) -> QueueResult<Job> {
        let mut job = self
            .get(job_id)
            .await?
            .ok_or_else(|| QueueError::JobNotFound(job_id.clone()))?;
        job.apply(update)?;
        self.put(job.clone()).await?;
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::{JobStatus, MediaItem, OutputSettings};

    #[test]
    fn test_key_layout() {
        let store = RedisJobStore::new(&RedisConfig::default()).unwrap();
        let id = JobId::from_string("abc");
        assert_eq!(store.key(&id), "reel:job:abc");
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_round_trip_against_redis() {
        let store = RedisJobStore::new(&RedisConfig::from_env()).unwrap();
        let job = Job::new(1, vec![MediaItem::image("https://example.com/a.png", 2.0)], OutputSettings::default());
        let id = job.id.clone();

        store.put(job).await.unwrap();
        store.update(&id, JobUpdate::Start { message: "go".into() }).await.unwrap();
        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Processing);
    }
}
