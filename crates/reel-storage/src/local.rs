//! Local-disk storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reel_media::{fs_utils::move_file, Fetcher};
use tracing::{debug, info};

use crate::error::{validate_key, StorageError, StorageResult};
use crate::storage::Storage;

/// Files under a root directory; references are absolute paths.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    fetcher: Fetcher,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, fetcher: Fetcher) -> Self {
        Self {
            root: root.into(),
            fetcher,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn save(&self, key: &str, data: Vec<u8>) -> StorageResult<String> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;

        debug!("Saved {} bytes to {}", data.len(), path.display());
        Ok(path.to_string_lossy().to_string())
    }

    async fn save_file(&self, key: &str, path: &Path) -> StorageResult<String> {
        let dest = self.path_for(key)?;
        move_file(path, &dest).await?;

        info!("Saved {} to {}", path.display(), dest.display());
        Ok(dest.to_string_lossy().to_string())
    }

    async fn resolve(&self, reference: &str, _scratch: &Path) -> StorageResult<PathBuf> {
        if !self.is_reference(reference) {
            return Err(StorageError::InvalidReference(reference.to_string()));
        }
        let path = PathBuf::from(reference);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::not_found(reference));
        }
        Ok(path)
    }

    async fn fetch_remote(&self, url: &str, destination: &Path) -> StorageResult<PathBuf> {
        Ok(self.fetcher.fetch(url, destination).await?)
    }

    fn is_reference(&self, source: &str) -> bool {
        let path = Path::new(source);
        path.is_absolute()
            && path.starts_with(&self.root)
            && !path.components().any(|c| matches!(c, std::path::Component::ParentDir))
    }
}
