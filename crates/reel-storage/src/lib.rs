//! Storage backends for reel inputs and outputs.
//!
//! This crate provides:
//! - The `Storage` trait the pipeline is written against
//! - Local-disk storage with path references
//! - S3-compatible object storage with `s3://` references
//! - Backend selection from environment configuration

pub mod config;
pub mod error;
pub mod local;
pub mod s3;
pub mod storage;

pub use config::{S3Config, StorageBackend, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use local::LocalStorage;
pub use s3::S3Storage;
pub use storage::{content_type_for, Storage};
