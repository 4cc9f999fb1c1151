//! Storage backend configuration.

use std::path::PathBuf;
use std::sync::Arc;

use reel_media::Fetcher;

use crate::error::{StorageError, StorageResult};
use crate::local::LocalStorage;
use crate::s3::S3Storage;
use crate::storage::Storage;

/// Default root for local storage.
pub const DEFAULT_STORAGE_PATH: &str = "/storage";

/// Which backend holds inputs and outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    Local,
    S3,
}

impl StorageBackend {
    pub fn from_name(name: &str) -> StorageResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "local" | "" => Ok(Self::Local),
            // MinIO and R2 speak the S3 API.
            "s3" | "minio" | "r2" => Ok(Self::S3),
            other => Err(StorageError::config_error(format!("unknown storage backend '{}'", other))),
        }
    }
}

/// Connection settings for an S3-compatible store.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Custom endpoint (MinIO, R2); AWS default when absent
    pub endpoint_url: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    pub region: String,
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("S3_ENDPOINT").ok().filter(|s| !s.is_empty()),
            access_key_id: std::env::var("S3_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("S3_ACCESS_KEY not set"))?,
            secret_access_key: std::env::var("S3_SECRET_KEY")
                .map_err(|_| StorageError::config_error("S3_SECRET_KEY not set"))?,
            bucket: std::env::var("S3_BUCKET").map_err(|_| StorageError::config_error("S3_BUCKET not set"))?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        })
    }
}

/// Storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory for the local backend
    pub local_root: PathBuf,
    /// Required when `backend` is S3
    pub s3: Option<S3Config>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_root: PathBuf::from(DEFAULT_STORAGE_PATH),
            s3: None,
        }
    }
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let backend = StorageBackend::from_name(&std::env::var("STORAGE_BACKEND").unwrap_or_default())?;
        let s3 = match backend {
            StorageBackend::S3 => Some(S3Config::from_env()?),
            StorageBackend::Local => None,
        };

        Ok(Self {
            backend,
            local_root: std::env::var("STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_STORAGE_PATH)),
            s3,
        })
    }

    /// Local storage rooted at `root`.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self {
            local_root: root.into(),
            ..Self::default()
        }
    }

    /// Construct the configured backend.
    pub fn build(self, fetcher: Fetcher) -> StorageResult<Arc<dyn Storage>> {
        match self.backend {
            StorageBackend::Local => Ok(Arc::new(LocalStorage::new(self.local_root, fetcher))),
            StorageBackend::S3 => {
                let s3 = self
                    .s3
                    .ok_or_else(|| StorageError::config_error("S3 backend selected without S3 settings"))?;
                Ok(Arc::new(S3Storage::new(s3, fetcher)))
            }
        }
    }
}
