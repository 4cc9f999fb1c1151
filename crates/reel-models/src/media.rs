//! Media items as they arrive from a spreadsheet row.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Video clip, trimmed to a window
    Video,
    /// Still image held for a duration
    Image,
    /// Detect from the file itself
    #[default]
    Auto,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Image => "image",
            MediaType::Auto => "auto",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A seconds value as typed into a spreadsheet cell.
///
/// Cells may hold numbers or text; validation happens when the item is
/// processed, not on submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RawSeconds {
    Number(f64),
    Text(String),
}

impl RawSeconds {
    /// Parse into seconds. Returns `None` for non-numeric or non-finite values.
    pub fn as_seconds(&self) -> Option<f64> {
        let value = match self {
            RawSeconds::Number(n) => *n,
            RawSeconds::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for RawSeconds {
    fn from(value: f64) -> Self {
        RawSeconds::Number(value)
    }
}

impl fmt::Display for RawSeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawSeconds::Number(n) => write!(f, "{}", n),
            RawSeconds::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// One entry of a row: a source plus the window of it to use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MediaItem {
    /// Remote URL, storage reference, or local path
    #[serde(default, alias = "path", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Requested clip duration in seconds (required, > 0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<RawSeconds>,

    /// Offset into the source in seconds (defaults to 0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<RawSeconds>,

    /// Declared media type
    #[serde(default)]
    pub media_type: MediaType,
}

impl MediaItem {
    /// Create a video item.
    pub fn video(url: impl Into<String>, duration: f64, start_time: f64) -> Self {
        Self {
            url: Some(url.into()),
            duration: Some(duration.into()),
            start_time: Some(start_time.into()),
            media_type: MediaType::Video,
        }
    }

    /// Create an image item.
    pub fn image(url: impl Into<String>, duration: f64) -> Self {
        Self {
            url: Some(url.into()),
            duration: Some(duration.into()),
            start_time: None,
            media_type: MediaType::Image,
        }
    }

    /// Create an item whose type is detected from the file.
    pub fn auto(url: impl Into<String>, duration: f64) -> Self {
        Self {
            url: Some(url.into()),
            duration: Some(duration.into()),
            start_time: None,
            media_type: MediaType::Auto,
        }
    }

    /// Source reference, if one was given.
    pub fn source(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Whether the source is fetched over HTTP(S).
    pub fn is_remote(&self) -> bool {
        self.source()
            .map(|s| s.starts_with("http://") || s.starts_with("https://"))
            .unwrap_or(false)
    }
}
