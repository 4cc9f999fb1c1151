//! FFprobe media information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Media file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds (0 when the container reports none)
    pub duration: f64,
    /// Duration of the video stream itself, when reported
    pub video_duration: Option<f64>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Video codec
    pub codec: String,
    /// Demuxer name(s), e.g. "mov,mp4,m4a,3gp,3g2,mj2" or "png_pipe"
    pub format_name: String,
    /// Whether an audio stream is present
    pub has_audio: bool,
    /// File size in bytes
    pub size: u64,
}

impl MediaInfo {
    /// Whether FFprobe opened the file as a still picture rather than a timeline.
    pub fn is_still_image(&self) -> bool {
        let demuxer_is_image = self
            .format_name
            .split(',')
            .any(|f| f == "image2" || f.ends_with("_pipe"));
        demuxer_is_image || self.duration <= 0.0
    }

    /// Seconds of decodable picture.
    ///
    /// Containers often outlast their video stream (a longer audio track),
    /// so the shorter of the two wins.
    pub fn playable_duration(&self) -> f64 {
        match self.video_duration {
            Some(video) if self.duration > 0.0 => video.min(self.duration),
            Some(video) => video,
            None => self.duration,
        }
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

/// Probe a media file.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::SourceNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::probe_failed(
            path,
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    parse_probe_output(path, &output.stdout)
}

fn parse_probe_output(path: &Path, stdout: &[u8]) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::probe_failed(path, "no video stream found"))?;

    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(parse_seconds)
        .unwrap_or(0.0);
    let video_duration = video_stream
        .duration
        .as_deref()
        .and_then(parse_seconds)
        .filter(|d| *d > 0.0);

    let size = probe
        .format
        .size
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let fps = video_stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video_stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(30.0);

    Ok(MediaInfo {
        duration,
        video_duration,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        fps,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
        format_name: probe.format.format_name.unwrap_or_default(),
        has_audio,
        size,
    })
}

fn parse_seconds(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|d| d.is_finite())
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        return (den > 0.0 && num > 0.0).then(|| num / den);
    }
    s.parse().ok().filter(|f: &f64| *f > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_parse_video_with_audio() {
        let json = br#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720,
                 "avg_frame_rate": "25/1", "r_frame_rate": "25/1"},
                {"codec_type": "audio", "codec_name": "aac"}
            ],
            "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "10.000000", "size": "1048576"}
        }"#;

        let info = parse_probe_output(Path::new("a.mp4"), json).unwrap();
        assert_eq!((info.width, info.height), (1280, 720));
        assert!((info.duration - 10.0).abs() < 1e-9);
        assert!(info.has_audio);
        assert!(!info.is_still_image());
    }

    #[test]
    fn test_video_stream_shorter_than_container() {
        let json = br#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 640, "height": 360,
                 "avg_frame_rate": "25/1", "duration": "9.960000"},
                {"codec_type": "audio", "codec_name": "aac", "duration": "10.000000"}
            ],
            "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "10.000000"}
        }"#;

        let info = parse_probe_output(Path::new("a.mp4"), json).unwrap();
        assert_eq!(info.video_duration, Some(9.96));
        assert!((info.playable_duration() - 9.96).abs() < 1e-9);
    }

    #[test]
    fn test_playable_duration_falls_back_to_container() {
        let json = br#"{
            "streams": [{"codec_type": "video", "codec_name": "vp9", "width": 640, "height": 360}],
            "format": {"format_name": "matroska,webm", "duration": "4.500000"}
        }"#;

        let info = parse_probe_output(Path::new("a.webm"), json).unwrap();
        assert_eq!(info.video_duration, None);
        assert!((info.playable_duration() - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_still_image() {
        let json = br#"{
            "streams": [{"codec_type": "video", "codec_name": "png", "width": 800, "height": 600,
                         "avg_frame_rate": "0/0", "r_frame_rate": "25/1"}],
            "format": {"format_name": "png_pipe", "size": "2048"}
        }"#;

        let info = parse_probe_output(Path::new("a.bin"), json).unwrap();
        assert!(!info.has_audio);
        assert_eq!(info.duration, 0.0);
        assert!(info.is_still_image());
        assert!((info.fps - 25.0).abs() < 0.01);
    }

    #[test]
    fn test_parse_audio_only_is_rejected() {
        let json = br#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "3.0"}}"#;
        let err = parse_probe_output(Path::new("a.mp3"), json).unwrap_err();
        assert!(matches!(err, MediaError::ProbeFailed { .. }));
    }
}
