//! S3-compatible object storage (AWS S3, Cloudflare R2, MinIO).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use reel_media::Fetcher;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::S3Config;
use crate::error::{validate_key, StorageError, StorageResult};
use crate::storage::{content_type_for, Storage};

const SCHEME: &str = "s3://";

/// Split `s3://bucket/key` into its parts.
pub fn parse_reference(reference: &str) -> Option<(&str, &str)> {
    let rest = reference.strip_prefix(SCHEME)?;
    let (bucket, key) = rest.split_once('/')?;
    (!bucket.is_empty() && !key.is_empty()).then_some((bucket, key))
}

/// Object-store backend; references are `s3://<bucket>/<key>`.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    fetcher: Fetcher,
}

impl S3Storage {
    pub fn new(config: S3Config, fetcher: Fetcher) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "reel-storage",
        );

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
            fetcher,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn reference(&self, key: &str) -> String {
        format!("{}{}/{}", SCHEME, self.bucket, key)
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn save(&self, key: &str, data: Vec<u8>) -> StorageResult<String> {
        validate_key(key)?;
        debug!("Uploading {} bytes to {}", data.len(), key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type_for(key))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        Ok(self.reference(key))
    }

    async fn save_file(&self, key: &str, path: &Path) -> StorageResult<String> {
        validate_key(key)?;
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type_for(key))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {} to {}", path.display(), self.reference(key));
        Ok(self.reference(key))
    }

    async fn resolve(&self, reference: &str, scratch: &Path) -> StorageResult<PathBuf> {
        let (bucket, key) =
            parse_reference(reference).ok_or_else(|| StorageError::InvalidReference(reference.to_string()))?;

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let text = format!("{:?}", e);
                if text.contains("NoSuchKey") || text.contains("NotFound") {
                    StorageError::not_found(reference)
                } else {
                    StorageError::download_failed(e.to_string())
                }
            })?;

        let file_name = key.rsplit('/').next().unwrap_or(key);
        let local = scratch.join(file_name);
        tokio::fs::create_dir_all(scratch).await?;

        let written = match write_body(response.body, &local).await {
            Ok(n) => n,
            Err(e) => {
                let _ = tokio::fs::remove_file(&local).await;
                return Err(e);
            }
        };
        info!(bytes = written, "Downloaded {} to {}", reference, local.display());
        Ok(local)
    }

    async fn fetch_remote(&self, url: &str, destination: &Path) -> StorageResult<PathBuf> {
        Ok(self.fetcher.fetch(url, destination).await?)
    }

    fn is_reference(&self, source: &str) -> bool {
        parse_reference(source).is_some()
    }
}

/// Stream an object body to `local` chunk by chunk.
async fn write_body(mut body: ByteStream, local: &Path) -> StorageResult<u64> {
    let mut file = tokio::fs::File::create(local).await?;
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| StorageError::download_failed(e.to_string()))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}
