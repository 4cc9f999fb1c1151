//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while acquiring or processing media.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Download failed for {url} after {attempts} attempt(s): {message}")]
    Download {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("Unexpected content type '{content_type}' from {url}: expected media, got a document")]
    UnexpectedContentType { url: String, content_type: String },

    #[error("Downloaded file is empty: {url}")]
    EmptyContent { url: String },

    #[error("Source file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("No file path or URL provided for media item {index}")]
    MissingSource { index: usize },

    #[error("Invalid duration for media item {index}: {reason}")]
    InvalidDuration { index: usize, reason: String },

    #[error("Invalid start time for media item {index}: {value}")]
    InvalidStartTime { index: usize, value: String },

    #[error("Nothing to assemble: no clips were built")]
    EmptyTimeline,

    #[error("Invalid resolution: {0}")]
    InvalidResolution(String),

    #[error("Encoding failed: {message}")]
    Encode {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFprobe failed for {path}: {message}")]
    ProbeFailed { path: PathBuf, message: String },

    #[error("Image decode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create a download failure error.
    pub fn download(url: impl Into<String>, attempts: u32, message: impl Into<String>) -> Self {
        Self::Download {
            url: url.into(),
            attempts,
            message: message.into(),
        }
    }

    /// Create an encode failure error.
    pub fn encode(message: impl Into<String>, stderr: Option<String>, exit_code: Option<i32>) -> Self {
        Self::Encode {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn invalid_duration(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidDuration {
            index,
            reason: reason.into(),
        }
    }

    pub fn probe_failed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ProbeFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether the error came from the network rather than the content.
    pub fn is_download_failure(&self) -> bool {
        matches!(
            self,
            MediaError::Download { .. }
                | MediaError::UnexpectedContentType { .. }
                | MediaError::EmptyContent { .. }
        )
    }
}
