//! Clip building.
//!
//! Every media item becomes one intermediate file whose duration equals
//! the requested duration exactly:
//! - Videos are trimmed from `start_time`, and padded with black frames
//!   (plus silence) when the source runs out early
//! - A `start_time` at or past the end of the source yields a black filler
//! - Still images are held on screen for the requested duration
//!
//! Intermediates share one encoding (H.264 yuv420p, even dimensions, AAC
//! stereo 44.1kHz, job frame rate) so the assembler can concatenate them
//! with a single filter graph.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use reel_models::MediaType;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_media;
use crate::still::prepare_still;

/// Size used for filler when the source reports no usable dimensions.
pub const FALLBACK_WIDTH: u32 = 640;
pub const FALLBACK_HEIGHT: u32 = 480;

/// Shortfalls below this are treated as rounding, not padding.
const PAD_EPSILON: f64 = 1e-3;

/// Rounds down to even dimensions, never below 2x2.
const EVEN_SCALE: &str = "scale=max(2\\,trunc(iw/2)*2):max(2\\,trunc(ih/2)*2),setsar=1";

/// A built intermediate clip.
///
/// The file is removed when the clip is dropped.
#[derive(Debug)]
pub struct Clip {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub duration: f64,
    pub has_audio: bool,
}

impl Clip {
    /// Whether the clip is already at the given size.
    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }
}

impl Drop for Clip {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Failed to remove intermediate {}: {}", self.path.display(), e);
            }
        }
    }
}

/// What to render for a video item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClipPlan {
    /// Start lies past the end of the source: black for the whole duration.
    Filler { duration: f64 },
    /// Take `span` seconds from `start`, then `pad` seconds of black.
    Trim { start: f64, span: f64, pad: f64 },
}

impl ClipPlan {
    pub fn total_duration(&self) -> f64 {
        match *self {
            ClipPlan::Filler { duration } => duration,
            ClipPlan::Trim { span, pad, .. } => span + pad,
        }
    }
}

/// Decide how to cut `duration` seconds starting at `start` from a source
/// with `source_duration` seconds of picture, rendered at `fps`.
///
/// Less than one frame left after `start` decodes to nothing, so that is
/// filler too.
pub fn plan_video_clip(source_duration: f64, start: f64, duration: f64, fps: u32) -> ClipPlan {
    let start = start.max(0.0);
    let frame = 1.0 / fps.max(1) as f64;
    let available = source_duration - start;
    if available < frame {
        return ClipPlan::Filler { duration };
    }

    let span = duration.min(available);
    let shortfall = duration - span;
    let (span, pad) = if shortfall > PAD_EPSILON {
        (span, shortfall)
    } else {
        (duration, 0.0)
    };

    ClipPlan::Trim { start, span, pad }
}

/// Encoding shared by every intermediate file.
pub(crate) fn intermediate_encoding(cmd: FfmpegCommand, fps: u32, with_audio: bool) -> FfmpegCommand {
    let cmd = cmd
        .video_codec("libx264")
        .preset("ultrafast")
        .crf(18)
        .pixel_format("yuv420p")
        .frame_rate(fps);
    if with_audio {
        cmd.audio_codec("aac").output_args(["-ar", "44100", "-ac", "2"])
    } else {
        cmd.no_audio()
    }
}

pub(crate) fn even(n: u32) -> u32 {
    n - n % 2
}

/// Output size of [`EVEN_SCALE`] for a `width`x`height` input.
pub(crate) fn even_dimensions(width: u32, height: u32) -> (u32, u32) {
    (even(width).max(2), even(height).max(2))
}

/// Builds intermediate clips inside a job's scratch directory.
#[derive(Debug, Clone)]
pub struct ClipBuilder {
    work_dir: PathBuf,
    fps: u32,
    runner: FfmpegRunner,
}

impl ClipBuilder {
    pub fn new(work_dir: impl AsRef<Path>, fps: u32) -> Self {
        Self {
            work_dir: work_dir.as_ref().to_path_buf(),
            fps: fps.max(1),
            runner: FfmpegRunner::new(),
        }
    }

    fn clip_path(&self, index: usize) -> PathBuf {
        self.work_dir.join(format!("clip_{:03}.mp4", index))
    }

    fn intermediate(&self, cmd: FfmpegCommand, with_audio: bool) -> FfmpegCommand {
        intermediate_encoding(cmd, self.fps, with_audio)
    }

    /// Build the clip for one item whose type is already known.
    pub async fn build(
        &self,
        index: usize,
        source: &Path,
        media_type: MediaType,
        start_time: f64,
        duration: f64,
    ) -> MediaResult<Clip> {
        if !(duration.is_finite() && duration > 0.0) {
            return Err(MediaError::invalid_duration(index, format!("{} is not a positive number", duration)));
        }
        match media_type {
            MediaType::Image => self.build_image(index, source, duration).await,
            MediaType::Video | MediaType::Auto => self.build_video(index, source, start_time, duration).await,
        }
    }

    /// Trim (and pad) a video source.
    pub async fn build_video(&self, index: usize, source: &Path, start_time: f64, duration: f64) -> MediaResult<Clip> {
        let info = probe_media(source).await?;
        let source_duration = info.playable_duration();
        let plan = plan_video_clip(source_duration, start_time, duration, self.fps);

        let (width, height) = match (info.width, info.height) {
            (0, _) | (_, 0) => (FALLBACK_WIDTH, FALLBACK_HEIGHT),
            (w, h) => even_dimensions(w, h),
        };

        info!(
            index,
            source = %source.display(),
            source_duration,
            ?plan,
            "Building video clip"
        );

        let output = self.clip_path(index);
        let clip = match plan {
            ClipPlan::Filler { duration } => {
                warn!(
                    index,
                    start_time,
                    source_duration,
                    "Start time is past the end of the source, using black filler"
                );
                let cmd = FfmpegCommand::to_output(&output).lavfi_input(format!(
                    "color=c=black:s={}x{}:r={}:d={:.3}",
                    width, height, self.fps, duration
                ));
                let cmd = self.intermediate(cmd.video_filter("setsar=1").output_duration(duration), false);
                self.runner.run(&cmd).await?;
                Clip {
                    path: output,
                    width,
                    height,
                    duration,
                    has_audio: false,
                }
            }
            ClipPlan::Trim { start, span, pad } => {
                let mut filter = EVEN_SCALE.to_string();
                if pad > 0.0 {
                    info!(index, pad_seconds = pad, "Source shorter than requested, padding with black");
                    filter.push_str(&format!(",tpad=stop_mode=add:stop_duration={:.3}:color=black", pad));
                }

                let mut cmd = FfmpegCommand::to_output(&output)
                    .input(source)
                    .seek(start)
                    .duration(span)
                    .map("0:v:0")
                    .video_filter(filter);
                if info.has_audio {
                    cmd = cmd.map("0:a:0");
                    if pad > 0.0 {
                        cmd = cmd.audio_filter("apad");
                    }
                }
                let cmd = self.intermediate(cmd.output_duration(plan.total_duration()), info.has_audio);
                self.runner.run(&cmd).await?;
                Clip {
                    path: output,
                    width,
                    height,
                    duration: plan.total_duration(),
                    has_audio: info.has_audio,
                }
            }
        };

        Ok(clip)
    }

    /// Hold a still image on screen for `duration` seconds.
    pub async fn build_image(&self, index: usize, source: &Path, duration: f64) -> MediaResult<Clip> {
        let flattened = self.work_dir.join(format!("still_{:03}.png", index));
        let still = prepare_still(source, &flattened).await?;

        info!(index, source = %source.display(), duration, "Building image clip");

        let output = self.clip_path(index);
        let cmd = FfmpegCommand::to_output(&output)
            .input(&still.path)
            .loop_input()
            .input_arg("-framerate")
            .input_arg(self.fps.to_string())
            .duration(duration)
            .video_filter(EVEN_SCALE)
            .output_duration(duration);
        let result = self.runner.run(&self.intermediate(cmd, false)).await;

        if let Err(e) = tokio::fs::remove_file(&still.path).await {
            debug!("Failed to remove {}: {}", still.path.display(), e);
        }
        result?;

        let (width, height) = even_dimensions(still.width, still.height);
        Ok(Clip {
            path: output,
            width,
            height,
            duration,
            has_audio: false,
        })
    }
}
