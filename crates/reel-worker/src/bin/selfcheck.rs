use std::path::Path;
use std::process::Command;

use reel_media::{check_ffmpeg, check_ffprobe};
use reel_storage::StorageBackend;
use reel_worker::{JobStoreBackend, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env()?;

    println!(
        "reel-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_tool(&check_ffmpeg()?)?;
    ensure_tool(&check_ffprobe()?)?;

    let backend = StorageBackend::from_name(&std::env::var("STORAGE_BACKEND").unwrap_or_default())?;
    if backend == StorageBackend::S3 {
        ensure_env_present(&["S3_BUCKET", "S3_ACCESS_KEY", "S3_SECRET_KEY"])?;
    }
    if config.job_store == JobStoreBackend::Redis || config.publish_status {
        ensure_env_present(&["REDIS_URL"])?;
    }

    println!("reel-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    let probe = tempfile::NamedTempFile::new_in(path)
        .map_err(|e| anyhow::anyhow!("work dir {} is not writable: {}", path.display(), e))?;
    drop(probe);
    Ok(())
}

fn ensure_tool(binary: &Path) -> anyhow::Result<()> {
    let output = Command::new(binary)
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("{} not available: {}", binary.display(), e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "{} -version failed: {:?}",
            binary.display(),
            output.status
        ));
    }
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
