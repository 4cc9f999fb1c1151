//! Spreadsheet reel worker.
//!
//! This crate provides:
//! - The per-job pipeline (acquire, build, normalize, assemble, store)
//! - Weighted progress reporting
//! - Job submission, status queries and the fixed-size executor pool
//! - Worker configuration and structured job logging

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod runner;
pub mod service;

pub use config::{JobStoreBackend, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use executor::{job_pool, run_batch, JobExecutor, ShutdownHandle};
pub use logging::JobLogger;
pub use pipeline::{FfmpegStages, MediaStages, Pipeline, ResolvedItem};
pub use progress::{ProgressObserver, ProgressTracker};
pub use runner::JobRunner;
pub use service::JobService;
