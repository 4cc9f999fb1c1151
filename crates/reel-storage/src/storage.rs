//! Storage abstraction shared by the pipeline.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::StorageResult;

/// Where inputs come from and outputs go.
///
/// A *reference* is the string a backend hands out from `save`/`save_file`
/// and accepts back in `resolve`: `/storage/<key>` style paths for local
/// disk, `s3://<bucket>/<key>` for object stores.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store bytes under `key`, returning a reference.
    async fn save(&self, key: &str, data: Vec<u8>) -> StorageResult<String>;

    /// Store a local file under `key`, returning a reference.
    ///
    /// The source file may be consumed (moved) by the backend.
    async fn save_file(&self, key: &str, path: &Path) -> StorageResult<String>;

    /// Make a reference available as a local file, using `scratch` for any
    /// copy that has to be made.
    async fn resolve(&self, reference: &str, scratch: &Path) -> StorageResult<PathBuf>;

    /// Download an HTTP(S) URL to `destination`.
    async fn fetch_remote(&self, url: &str, destination: &Path) -> StorageResult<PathBuf>;

    /// Whether `source` is a reference this backend can `resolve`.
    fn is_reference(&self, source: &str) -> bool;
}

/// MIME type for a key, from its extension.
pub fn content_type_for(key: &str) -> &'static str {
    let ext = key
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}
