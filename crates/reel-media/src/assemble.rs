//! Timeline assembly and final encoding.
//!
//! Normalized clips are joined in order with one `concat` filter graph
//! and encoded straight to the output container, so there is a single
//! lossy pass after the intermediates.

use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use reel_models::{OutputFormat, OutputSettings};

use crate::clip::Clip;
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Audio bitrate of the final encode.
const OUTPUT_AUDIO_BITRATE: &str = "128k";

/// A compiled concatenation, ready to hand to FFmpeg.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelinePlan {
    pub inputs: Vec<PathBuf>,
    pub filter_graph: String,
    pub output_args: Vec<String>,
    pub output_path: PathBuf,
    pub with_audio: bool,
    /// Sum of clip durations, used to turn encoder time into a fraction
    pub total_duration: f64,
}

impl TimelinePlan {
    pub fn to_command(&self) -> FfmpegCommand {
        let cmd = self
            .inputs
            .iter()
            .fold(FfmpegCommand::to_output(&self.output_path), |cmd, input| cmd.input(input));
        cmd.filter_complex(&self.filter_graph)
            .output_args(self.output_args.iter().cloned())
    }
}

/// Compile the concatenation of `clips` into `output`.
///
/// When at least one clip has sound, silent clips get a generated silent
/// track of their own length so audio stays aligned; when none do, the
/// output carries no audio stream at all.
pub fn plan_timeline(clips: &[Clip], settings: &OutputSettings, output: &Path) -> MediaResult<TimelinePlan> {
    if clips.is_empty() {
        return Err(MediaError::EmptyTimeline);
    }

    let fps = settings.effective_fps();
    let with_audio = clips.iter().any(|c| c.has_audio);
    let mut filters = Vec::with_capacity(clips.len() * 2 + 1);
    let mut concat_inputs = String::new();

    for (i, clip) in clips.iter().enumerate() {
        filters.push(format!(
            "[{i}:v]fps={fps},format=yuv420p,setsar=1,setpts=PTS-STARTPTS[v{i}]"
        ));
        concat_inputs.push_str(&format!("[v{i}]"));

        if with_audio {
            if clip.has_audio {
                filters.push(format!(
                    "[{i}:a]aformat=sample_rates=44100:channel_layouts=stereo,asetpts=PTS-STARTPTS[a{i}]"
                ));
            } else {
                filters.push(format!(
                    "anullsrc=r=44100:cl=stereo,atrim=duration={:.3}[a{i}]",
                    clip.duration
                ));
            }
            concat_inputs.push_str(&format!("[a{i}]"));
        }
    }

    let n = clips.len();
    if with_audio {
        filters.push(format!("{concat_inputs}concat=n={n}:v=1:a=1[outv][outa]"));
    } else {
        filters.push(format!("{concat_inputs}concat=n={n}:v=1:a=0[outv]"));
    }

    let quality = settings.quality.preset();
    let mut output_args: Vec<String> = vec!["-map".into(), "[outv]".into()];
    if with_audio {
        output_args.extend(["-map".into(), "[outa]".into()]);
    }
    let video_encoder = settings.video_encoder();
    output_args.extend([
        "-c:v".into(),
        video_encoder.to_string(),
        "-b:v".into(),
        quality.bitrate.into(),
    ]);
    // Speed presets are an x264/x265 option.
    if matches!(video_encoder, "libx264" | "libx265") {
        output_args.extend(["-preset".into(), quality.preset.into()]);
    }
    output_args.extend([
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-r".into(),
        fps.to_string(),
    ]);
    if with_audio {
        output_args.extend([
            "-c:a".into(),
            settings.audio_encoder().to_string(),
            "-b:a".into(),
            OUTPUT_AUDIO_BITRATE.into(),
        ]);
    } else {
        output_args.push("-an".into());
    }
    if matches!(settings.format, OutputFormat::Mp4 | OutputFormat::Mov) {
        output_args.extend(["-movflags".into(), "+faststart".into()]);
    }

    Ok(TimelinePlan {
        inputs: clips.iter().map(|c| c.path.clone()).collect(),
        filter_graph: filters.join(";"),
        output_args,
        output_path: output.to_path_buf(),
        with_audio,
        total_duration: clips.iter().map(|c| c.duration).sum(),
    })
}

/// Concatenate and encode `clips` into `output`.
///
/// `on_progress` receives the encoded fraction of the timeline in
/// `0.0..=1.0`. The clips are consumed and their files removed once the
/// encode finishes; a partial output is removed on failure.
pub async fn assemble_and_encode<F>(
    clips: Vec<Clip>,
    settings: &OutputSettings,
    output: &Path,
    on_progress: F,
) -> MediaResult<PathBuf>
where
    F: Fn(f64) + Send + 'static,
{
    let plan = plan_timeline(&clips, settings, output)?;

    info!(
        clips = clips.len(),
        duration = plan.total_duration,
        with_audio = plan.with_audio,
        codec = %settings.codec,
        quality = settings.quality.as_str(),
        output = %output.display(),
        "Assembling final video"
    );

    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let total = plan.total_duration;
    let started = Instant::now();
    let result = FfmpegRunner::new()
        .run_with_progress(&plan.to_command(), move |p| on_progress(p.fraction(total)))
        .await;
    metrics::histogram!("reel_encode_seconds").record(started.elapsed().as_secs_f64());

    drop(clips);

    match result {
        Ok(()) => Ok(output.to_path_buf()),
        Err(e) => {
            if let Err(rm) = tokio::fs::remove_file(output).await {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove partial output {}: {}", output.display(), rm);
                }
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::QualityTier;

    fn clip(name: &str, duration: f64, has_audio: bool) -> Clip {
        Clip {
            // Nonexistent paths so Drop has nothing to remove.
            path: PathBuf::from(format!("/nonexistent/{name}")),
            width: 1280,
            height: 720,
            duration,
            has_audio,
        }
    }

    #[test]
    fn test_empty_timeline_rejected() {
        let err = plan_timeline(&[], &OutputSettings::default(), Path::new("out.mp4")).unwrap_err();
        assert!(matches!(err, MediaError::EmptyTimeline));
    }

    #[test]
    fn test_concat_with_audio() {
        let clips = vec![clip("a.mp4", 2.0, true), clip("b.mp4", 3.0, true)];
        let plan = plan_timeline(&clips, &OutputSettings::default(), Path::new("out.mp4")).unwrap();

        assert_eq!(plan.inputs.len(), 2);
        assert!(plan.with_audio);
        assert!(plan.filter_graph.ends_with("[v0][a0][v1][a1]concat=n=2:v=1:a=1[outv][outa]"));
        assert!((plan.total_duration - 5.0).abs() < 1e-9);
        assert!(plan.output_args.windows(2).any(|w| w == ["-map", "[outa]"]));
        assert!(plan.output_args.windows(2).any(|w| w == ["-movflags", "+faststart"]));
    }

    #[test]
    fn test_silent_clip_gets_generated_silence() {
        let clips = vec![clip("a.mp4", 2.0, true), clip("still.mp4", 1.5, false)];
        let plan = plan_timeline(&clips, &OutputSettings::default(), Path::new("out.mp4")).unwrap();

        assert!(plan.filter_graph.contains("anullsrc=r=44100:cl=stereo,atrim=duration=1.500[a1]"));
        assert!(!plan.filter_graph.contains("[1:a]"));
    }

    #[test]
    fn test_all_silent_drops_audio() {
        let clips = vec![clip("a.mp4", 2.0, false), clip("b.mp4", 2.0, false)];
        let plan = plan_timeline(&clips, &OutputSettings::default(), Path::new("out.mp4")).unwrap();

        assert!(!plan.with_audio);
        assert!(plan.filter_graph.ends_with("[v0][v1]concat=n=2:v=1:a=0[outv]"));
        assert!(plan.output_args.contains(&"-an".to_string()));
        assert!(!plan.output_args.contains(&"[outa]".to_string()));
    }

    #[test]
    fn test_quality_tier_selects_bitrate_and_preset() {
        let clips = vec![clip("a.mp4", 1.0, false)];
        let settings = OutputSettings::default().with_quality(QualityTier::High).with_fps(24);
        let plan = plan_timeline(&clips, &settings, Path::new("out.mp4")).unwrap();

        assert!(plan.output_args.windows(2).any(|w| w == ["-b:v", "2M"]));
        assert!(plan.output_args.windows(2).any(|w| w == ["-preset", "fast"]));
        assert!(plan.output_args.windows(2).any(|w| w == ["-r", "24"]));
        assert!(plan.filter_graph.starts_with("[0:v]fps=24,"));
    }

    #[test]
    fn test_webm_has_no_faststart() {
        let clips = vec![clip("a.mp4", 1.0, false)];
        let settings = OutputSettings {
            format: OutputFormat::Webm,
            ..OutputSettings::default()
        };
        let plan = plan_timeline(&clips, &settings, Path::new("out.webm")).unwrap();
        assert!(!plan.output_args.contains(&"+faststart".to_string()));
    }

    #[test]
    fn test_webm_encodes_vp9_and_opus() {
        let clips = vec![clip("a.mp4", 1.0, true)];
        let settings = OutputSettings::default().with_format(OutputFormat::Webm);
        let plan = plan_timeline(&clips, &settings, Path::new("out.webm")).unwrap();

        assert!(plan.output_args.windows(2).any(|w| w == ["-c:v", "libvpx-vp9"]));
        assert!(plan.output_args.windows(2).any(|w| w == ["-c:a", "libopus"]));
        assert!(!plan.output_args.contains(&"-preset".to_string()));
        assert!(!plan.output_args.iter().any(|a| a == "libx264" || a == "aac"));
    }

    #[test]
    fn test_command_lists_inputs_in_order() {
        let clips = vec![clip("first.mp4", 1.0, false), clip("second.mp4", 1.0, false)];
        let plan = plan_timeline(&clips, &OutputSettings::default(), Path::new("out.mp4")).unwrap();
        let args = plan.to_command().build_args();

        let inputs: Vec<&String> = args
            .iter()
            .zip(args.iter().skip(1))
            .filter(|(flag, _)| *flag == "-i")
            .map(|(_, v)| v)
            .collect();
        assert_eq!(inputs, ["/nonexistent/first.mp4", "/nonexistent/second.mp4"]);
        assert_eq!(args.last().unwrap(), "out.mp4");
    }
}
