#![deny(unreachable_patterns)]
//! Media stages of the SheetReel pipeline.
//!
//! This crate provides:
//! - Share-link resolution and resilient HTTP fetching
//! - FFprobe inspection and a type-safe FFmpeg command builder/runner
//! - Clip building (trim, pad, still images) with exact durations
//! - Resolution normalization
//! - Timeline concatenation and final encoding with progress

pub mod assemble;
pub mod clip;
pub mod command;
pub mod detect;
pub mod error;
pub mod fetch;
pub mod fs_utils;
pub mod normalize;
pub mod probe;
pub mod progress;
pub mod still;

pub use assemble::{assemble_and_encode, plan_timeline, TimelinePlan};
pub use clip::{plan_video_clip, Clip, ClipBuilder, ClipPlan};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use detect::{detect_media_type, is_image_extension, is_video_extension};
pub use error::{MediaError, MediaResult};
pub use fetch::{resolve, FetchConfig, Fetcher};
pub use normalize::{normalize, target_resolution};
pub use probe::{probe_media, MediaInfo};
pub use progress::FfmpegProgress;
