//! Output settings and quality tiers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default output frame rate
pub const DEFAULT_FPS: u32 = 30;
/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// WebM stand-ins for the default codecs
pub const WEBM_VIDEO_CODEC: &str = "libvpx-vp9";
pub const WEBM_AUDIO_CODEC: &str = "libopus";
/// Highest accepted frame rate
pub const MAX_FPS: u32 = 120;

/// Named encoder quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    #[default]
    Medium,
    High,
}

/// Bitrate and encoder speed for a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityPreset {
    /// Target video bitrate (FFmpeg notation)
    pub bitrate: &'static str,
    /// x264-style speed preset
    pub preset: &'static str,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        }
    }

    /// Fixed bitrate + preset table.
    pub fn preset(&self) -> QualityPreset {
        match self {
            QualityTier::Low => QualityPreset {
                bitrate: "500k",
                preset: "ultrafast",
            },
            QualityTier::Medium => QualityPreset {
                bitrate: "1M",
                preset: "faster",
            },
            QualityTier::High => QualityPreset {
                bitrate: "2M",
                preset: "fast",
            },
        }
    }

    /// Parse a tier name; unknown names fall back to medium.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "low" => QualityTier::Low,
            "high" => QualityTier::High,
            _ => QualityTier::Medium,
        }
    }
}

// Lenient on input: anything unrecognized becomes medium.
impl<'de> Deserialize<'de> for QualityTier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(QualityTier::from_name(&name))
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Avi,
    Mov,
    Webm,
}

impl OutputFormat {
    /// File extension (without dot).
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Avi => "avi",
            OutputFormat::Mov => "mov",
            OutputFormat::Webm => "webm",
        }
    }

    /// MIME type used when storing the output.
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "video/mp4",
            OutputFormat::Avi => "video/x-msvideo",
            OutputFormat::Mov => "video/quicktime",
            OutputFormat::Webm => "video/webm",
        }
    }
}

/// Errors parsing a `WIDTHxHEIGHT` string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid resolution '{0}', expected WIDTHxHEIGHT")]
pub struct ResolutionError(pub String);

/// Frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl FromStr for Resolution {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ResolutionError(s.to_string());
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(err)?;
        let width: u32 = w.trim().parse().map_err(|_| err())?;
        let height: u32 = h.trim().parse().map_err(|_| err())?;
        if width == 0 || height == 0 {
            return Err(err());
        }
        Ok(Self { width, height })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Output settings shared by every row of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OutputSettings {
    /// Target resolution as `WIDTHxHEIGHT`; first clip's size when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,

    /// Output frame rate
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Video codec (e.g., "libx264")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Quality tier
    #[serde(default)]
    pub quality: QualityTier,

    /// Container format
    #[serde(default)]
    pub format: OutputFormat,
}

fn default_fps() -> u32 {
    DEFAULT_FPS
}
fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            resolution: None,
            fps: DEFAULT_FPS,
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            quality: QualityTier::default(),
            format: OutputFormat::default(),
        }
    }
}

impl OutputSettings {
    /// Frame rate clamped to the supported range.
    pub fn effective_fps(&self) -> u32 {
        self.fps.clamp(1, MAX_FPS)
    }

    /// Video encoder for the container.
    ///
    /// WebM cannot hold H.264, so the default codec becomes VP9 there. An
    /// explicitly chosen codec is passed through untouched.
    pub fn video_encoder(&self) -> &str {
        match self.format {
            OutputFormat::Webm if self.codec == DEFAULT_VIDEO_CODEC => WEBM_VIDEO_CODEC,
            _ => &self.codec,
        }
    }

    /// Audio encoder for the container; AAC becomes Opus in WebM.
    pub fn audio_encoder(&self) -> &str {
        match self.format {
            OutputFormat::Webm if self.audio_codec == DEFAULT_AUDIO_CODEC => WEBM_AUDIO_CODEC,
            _ => &self.audio_codec,
        }
    }

    /// Returns settings with the given container format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Returns settings with the given quality tier.
    pub fn with_quality(mut self, quality: QualityTier) -> Self {
        self.quality = quality;
        self
    }

    /// Returns settings with the given frame rate.
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Returns settings with a target resolution.
    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = Some(resolution.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_table() {
        assert_eq!(QualityTier::Low.preset().bitrate, "500k");
        assert_eq!(QualityTier::Low.preset().preset, "ultrafast");
        assert_eq!(QualityTier::Medium.preset().bitrate, "1M");
        assert_eq!(QualityTier::High.preset().preset, "fast");
    }

    #[test]
    fn test_webm_swaps_default_codecs() {
        let webm = OutputSettings::default().with_format(OutputFormat::Webm);
        assert_eq!(webm.video_encoder(), "libvpx-vp9");
        assert_eq!(webm.audio_encoder(), "libopus");

        let custom = OutputSettings {
            codec: "libaom-av1".into(),
            audio_codec: "libvorbis".into(),
            ..webm
        };
        assert_eq!(custom.video_encoder(), "libaom-av1");
        assert_eq!(custom.audio_encoder(), "libvorbis");

        for format in [OutputFormat::Mp4, OutputFormat::Mov, OutputFormat::Avi] {
            let settings = OutputSettings::default().with_format(format);
            assert_eq!(settings.video_encoder(), "libx264");
            assert_eq!(settings.audio_encoder(), "aac");
        }
    }

    #[test]
    fn test_unknown_quality_defaults_to_medium() {
        let settings: OutputSettings = serde_json::from_str(r#"{"quality": "ultra"}"#).unwrap();
        assert_eq!(settings.quality, QualityTier::Medium);

        let settings: OutputSettings = serde_json::from_str(r#"{"quality": "LOW"}"#).unwrap();
        assert_eq!(settings.quality, QualityTier::Low);
    }

    #[test]
    fn test_settings_defaults() {
        let settings: OutputSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, OutputSettings::default());
        assert_eq!(settings.fps, 30);
        assert_eq!(settings.codec, "libx264");
        assert_eq!(settings.format.extension(), "mp4");
    }

    #[test]
    fn test_resolution_parsing() {
        assert_eq!("1920x1080".parse::<Resolution>().unwrap(), Resolution::new(1920, 1080));
        assert_eq!(" 640X360 ".parse::<Resolution>().unwrap(), Resolution::new(640, 360));
        assert!("1920".parse::<Resolution>().is_err());
        assert!("0x720".parse::<Resolution>().is_err());
        assert!("axb".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_effective_fps_clamped() {
        assert_eq!(OutputSettings::default().with_fps(0).effective_fps(), 1);
        assert_eq!(OutputSettings::default().with_fps(240).effective_fps(), 120);
    }
}
