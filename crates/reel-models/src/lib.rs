//! Shared data models for the SheetReel pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Media items as submitted from a spreadsheet row
//! - Output settings and quality tiers
//! - Jobs and the job state machine
//! - Batch (multi-row) submissions

pub mod batch;
pub mod job;
pub mod media;
pub mod settings;

// Re-export common types
pub use batch::{BatchRequest, SpreadsheetRow};
pub use job::{Job, JobError, JobId, JobResult, JobStatus, JobStatusView, JobUpdate};
pub use media::{MediaItem, MediaType, RawSeconds};
pub use settings::{OutputFormat, OutputSettings, QualityPreset, QualityTier, Resolution, ResolutionError};
