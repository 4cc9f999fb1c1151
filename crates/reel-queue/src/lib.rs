//! Job records and status delivery.
//!
//! This crate provides:
//! - The `JobStore` trait with in-memory and Redis implementations
//! - `StatusSink`s that push status changes to HTTP callbacks or Redis Pub/Sub
//! - `StatusUpdater`, the per-job task that serializes all record mutations

pub mod error;
pub mod redis_store;
pub mod sink;
pub mod store;
pub mod updater;

pub use error::{QueueError, QueueResult};
pub use redis_store::{RedisConfig, RedisJobStore};
pub use sink::{HttpStatusSink, RedisStatusSink, StatusSink};
pub use store::{JobStore, MemoryJobStore};
pub use updater::{StatusSender, StatusUpdater};
