//! Resolution normalization.

use std::path::PathBuf;
use tracing::info;

use reel_models::Resolution;

use crate::clip::{even_dimensions, intermediate_encoding, Clip};
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Frame size every clip of a job is brought to.
///
/// An explicit `WIDTHxHEIGHT` wins (rounded down to even numbers for
/// yuv420p); otherwise the first clip's size is used.
pub fn target_resolution(clips: &[Clip], requested: Option<&str>) -> MediaResult<Option<(u32, u32)>> {
    if let Some(raw) = requested.map(str::trim).filter(|s| !s.is_empty()) {
        let res: Resolution = raw
            .parse()
            .map_err(|e: reel_models::ResolutionError| MediaError::InvalidResolution(e.0))?;
        return Ok(Some(even_dimensions(res.width, res.height)));
    }
    Ok(clips.first().map(|c| (c.width, c.height)))
}

fn normalized_path(clip: &Clip) -> PathBuf {
    let stem = clip
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "clip".to_string());
    clip.path.with_file_name(format!("{}_norm.mp4", stem))
}

/// Bring every clip to one frame size.
///
/// Clips already at the target pass through untouched; the rest are
/// scaled (aspect ratio is not preserved) and their originals removed.
pub async fn normalize(clips: Vec<Clip>, requested: Option<&str>, fps: u32) -> MediaResult<Vec<Clip>> {
    let Some((width, height)) = target_resolution(&clips, requested)? else {
        return Ok(clips);
    };

    info!(width, height, clips = clips.len(), "Normalizing clip resolutions");

    let runner = FfmpegRunner::new();
    let mut normalized = Vec::with_capacity(clips.len());

    for clip in clips {
        if clip.matches(width, height) {
            normalized.push(clip);
            continue;
        }

        let output = normalized_path(&clip);
        let mut cmd = FfmpegCommand::new(&clip.path, &output)
            .map("0:v:0")
            .video_filter(format!("scale={}:{},setsar=1", width, height));
        if clip.has_audio {
            cmd = cmd.map("0:a:0");
        }
        let cmd = intermediate_encoding(cmd, fps, clip.has_audio);
        runner.run(&cmd).await?;

        normalized.push(Clip {
            path: output,
            width,
            height,
            duration: clip.duration,
            has_audio: clip.has_audio,
        });
        // `clip` drops here, removing the unscaled intermediate.
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn clip(dir: &Path, name: &str, width: u32, height: u32) -> Clip {
        Clip {
            path: dir.join(name),
            width,
            height,
            duration: 1.0,
            has_audio: false,
        }
    }

    #[test]
    fn test_target_defaults_to_first_clip() {
        let dir = tempfile::TempDir::new().unwrap();
        let clips = vec![clip(dir.path(), "a.mp4", 1280, 720), clip(dir.path(), "b.mp4", 640, 480)];
        assert_eq!(target_resolution(&clips, None).unwrap(), Some((1280, 720)));
        assert_eq!(target_resolution(&clips, Some("  ")).unwrap(), Some((1280, 720)));
    }

    #[test]
    fn test_explicit_target_wins_and_is_even() {
        let dir = tempfile::TempDir::new().unwrap();
        let clips = vec![clip(dir.path(), "a.mp4", 1280, 720)];
        assert_eq!(target_resolution(&clips, Some("1920x1080")).unwrap(), Some((1920, 1080)));
        assert_eq!(target_resolution(&clips, Some("641X481")).unwrap(), Some((640, 480)));
    }

    #[test]
    fn test_invalid_target_is_an_error() {
        let err = target_resolution(&[], Some("wide")).unwrap_err();
        assert!(matches!(err, MediaError::InvalidResolution(_)));
    }

    #[test]
    fn test_empty_without_target() {
        assert_eq!(target_resolution(&[], None).unwrap(), None);
    }

    #[tokio::test]
    async fn test_matching_clips_pass_through() {
        let dir = tempfile::TempDir::new().unwrap();
        let clips = vec![clip(dir.path(), "a.mp4", 640, 360), clip(dir.path(), "b.mp4", 640, 360)];
        let out = normalize(clips, None, 30).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].path, dir.path().join("b.mp4"));
    }

    #[test]
    fn test_normalized_path_sits_next_to_clip() {
        let c = clip(Path::new("/work/job"), "clip_002.mp4", 10, 10);
        assert_eq!(normalized_path(&c), Path::new("/work/job/clip_002_norm.mp4"));
    }
}
