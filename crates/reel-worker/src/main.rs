//! Reel worker binary.
//!
//! Runs a batch manifest (JSON `BatchRequest`) through the pipeline and
//! prints the final status of every row's job.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_media::{check_ffmpeg, check_ffprobe, Fetcher};
use reel_models::{BatchRequest, JobStatus};
use reel_queue::{HttpStatusSink, JobStore, MemoryJobStore, RedisConfig, RedisJobStore, RedisStatusSink, StatusSink};
use reel_storage::StorageConfig;
use reel_worker::{job_pool, run_batch, FfmpegStages, JobRunner, JobStoreBackend, Pipeline, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing()?;

    let manifest = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("REEL_BATCH_FILE").ok())
        .map(PathBuf::from)
        .context("usage: reel-worker <batch.json> (or set REEL_BATCH_FILE)")?;

    info!("Starting reel-worker");

    let raw = tokio::fs::read_to_string(&manifest)
        .await
        .with_context(|| format!("reading {}", manifest.display()))?;
    let batch: BatchRequest =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", manifest.display()))?;

    let ffmpeg = check_ffmpeg()?;
    let ffprobe = check_ffprobe()?;
    info!(ffmpeg = %ffmpeg.display(), ffprobe = %ffprobe.display(), "Found media tools");

    let config = WorkerConfig::from_env()?;
    info!("Worker config: {:?}", config);

    let store: Arc<dyn JobStore> = match config.job_store {
        JobStoreBackend::Memory => Arc::new(MemoryJobStore::new()),
        JobStoreBackend::Redis => Arc::new(RedisJobStore::new(&RedisConfig::from_env())?),
    };

    let mut sinks: Vec<Arc<dyn StatusSink>> = Vec::new();
    if let Some(url) = &config.status_callback_url {
        info!("Delivering status callbacks to {}", url);
        sinks.push(Arc::new(HttpStatusSink::new(url.clone())?));
    }
    if config.publish_status {
        sinks.push(Arc::new(RedisStatusSink::new(&RedisConfig::from_env().url)?));
    }

    let storage = StorageConfig::from_env()?.build(Fetcher::from_env()?)?;
    let pipeline = Pipeline::new(storage, Arc::new(FfmpegStages), &config.work_dir);
    let runner = JobRunner::new(Arc::clone(&store), sinks, pipeline, config.job_timeout_warning);

    let (service, executor) = job_pool(config, runner);
    let shutdown = executor.shutdown_handle();

    // Setup signal handler
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            shutdown.shutdown();
        }
    });

    let ids = match run_batch(service, executor, batch).await {
        Ok(ids) => ids,
        Err(e) => {
            error!("Executor error: {}", e);
            return Err(e.into());
        }
    };
    signal.abort();

    let mut statuses = Vec::with_capacity(ids.len());
    for id in &ids {
        if let Some(job) = store.get(id).await? {
            statuses.push(job.status_view());
        }
    }
    println!("{}", serde_json::to_string_pretty(&statuses)?);

    let failed = statuses.iter().filter(|s| s.status != JobStatus::Completed).count();
    info!(jobs = ids.len(), failed, "Worker shutdown complete");
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Colored text for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("reel=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}
