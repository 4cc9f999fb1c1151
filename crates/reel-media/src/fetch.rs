//! Remote media acquisition.
//!
//! Share links are rewritten to direct-download form, then the file is
//! streamed to disk with:
//! - Browser-like headers (some hosts reject unidentified clients)
//! - A best-effort HEAD probe for logging
//! - One-shot handling of the Google Drive "confirm download" interstitial
//! - Retry with exponential backoff for transport failures only
//! - Content-type, emptiness and size checks after the transfer
//!
//! Any partially written destination is removed on failure.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use futures_util::StreamExt;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{MediaError, MediaResult};

/// Host serving Google Drive share links.
pub const DRIVE_HOST: &str = "drive.google.com";

/// Host that refuses requests without a matching Referer.
const REFERER_HOST: &str = "test-videos.co.uk";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Bytes of an interstitial page scanned for a confirmation token.
const CONFIRM_SCAN_BYTES: usize = 1024;

/// Declared-vs-actual size difference tolerated without a warning.
const SIZE_TOLERANCE_BYTES: u64 = 1024;

/// Download progress is logged every this many bytes.
const PROGRESS_LOG_INTERVAL: u64 = 1024 * 1024;

static CONFIRM_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"confirm=([^&"]+)"#).unwrap());

/// Fetcher configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Total GET attempts (first try included)
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards
    pub base_backoff: Duration,
    /// Per-attempt timeout for ordinary hosts
    pub timeout: Duration,
    /// Per-attempt timeout for hosts prone to hanging
    pub drive_timeout: Duration,
    /// Timeout for the informational HEAD probe
    pub head_timeout: Duration,
    /// Hosts treated as Google Drive (interstitial handling, headers, timeout)
    pub drive_hosts: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
            drive_timeout: Duration::from_secs(30),
            head_timeout: Duration::from_secs(30),
            drive_hosts: vec![DRIVE_HOST.to_string()],
        }
    }
}

impl FetchConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            max_attempts: std::env::var("REEL_FETCH_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.max_attempts),
            base_backoff: std::env::var("REEL_FETCH_BACKOFF_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_backoff),
            timeout: secs("REEL_FETCH_TIMEOUT_SECS", defaults.timeout),
            drive_timeout: secs("REEL_FETCH_DRIVE_TIMEOUT_SECS", defaults.drive_timeout),
            head_timeout: secs("REEL_FETCH_HEAD_TIMEOUT_SECS", defaults.head_timeout),
            drive_hosts: defaults.drive_hosts,
        }
    }

    /// Set the base backoff delay.
    pub fn with_base_backoff(mut self, delay: Duration) -> Self {
        self.base_backoff = delay;
        self
    }

    /// Treat an extra host as Google Drive.
    pub fn with_drive_host(mut self, host: impl Into<String>) -> Self {
        self.drive_hosts.push(host.into());
        self
    }

    /// Delay slept after failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Rewrite share links into a directly fetchable URL.
///
/// Google Drive `.../file/d/<ID>/view` and `.../open?id=<ID>` links become
/// `https://drive.google.com/uc?export=download&id=<ID>`. Anything else is
/// returned unchanged.
pub fn resolve(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if parsed.host_str() != Some(DRIVE_HOST) {
        return url.to_string();
    }

    let from_path = parsed
        .path()
        .split_once("/file/d/")
        .and_then(|(_, rest)| rest.split('/').next())
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    let from_query = || {
        (parsed.path() == "/open")
            .then(|| parsed.query_pairs().find(|(k, _)| k == "id").map(|(_, v)| v.into_owned()))
            .flatten()
            .filter(|id| !id.is_empty())
    };

    match from_path.or_else(from_query) {
        Some(file_id) => {
            let direct = format!("https://{}/uc?export=download&id={}", DRIVE_HOST, file_id);
            info!(original = %url, resolved = %direct, "Converted Google Drive URL");
            direct
        }
        None => {
            if parsed.path() != "/uc" {
                warn!("Could not extract a file id from Google Drive URL {}", url);
            }
            url.to_string()
        }
    }
}

/// Whether a content type denotes a document page rather than media.
fn is_document_content_type(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.contains("text/html") || ct.contains("application/xhtml+xml")
}

/// Extract a Drive confirmation token from the start of an interstitial page.
fn find_confirm_token(prefix: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(prefix);
    if !text.contains("confirm=") && !text.contains("download_warning") {
        return None;
    }
    CONFIRM_TOKEN
        .captures(&text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Why a single GET attempt failed.
enum AttemptError {
    /// Network-level or HTTP status failure: worth retrying.
    Transport(String),
    /// Content problem or local IO failure: retrying won't help.
    Fatal(MediaError),
}

impl From<std::io::Error> for AttemptError {
    fn from(e: std::io::Error) -> Self {
        AttemptError::Fatal(MediaError::Io(e))
    }
}

/// Result of a successful transfer.
struct Transfer {
    declared_size: Option<u64>,
    written: u64,
}

/// HTTP downloader for row media.
#[derive(Debug, Clone)]
pub struct Fetcher {
    http: Client,
    config: FetchConfig,
}

impl Fetcher {
    /// Create a new fetcher.
    pub fn new(config: FetchConfig) -> MediaResult<Self> {
        let http = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| MediaError::HttpClient(e.to_string()))?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> MediaResult<Self> {
        Self::new(FetchConfig::from_env())
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Download `url` into `destination`.
    ///
    /// # Errors
    /// - `Download` when every attempt failed at the transport level
    /// - `UnexpectedContentType` when the server answers with a page
    /// - `EmptyContent` when zero bytes arrive
    pub async fn fetch(&self, url: &str, destination: impl AsRef<Path>) -> MediaResult<PathBuf> {
        let destination = destination.as_ref();
        let resolved = resolve(url);

        info!(url = %resolved, destination = %destination.display(), "Downloading file");

        match self.fetch_resolved(&resolved, destination).await {
            Ok(()) => Ok(destination.to_path_buf()),
            Err(e) => {
                warn!(url = %resolved, "Failed to download: {}", e);
                metrics::counter!("reel_fetch_failures_total").increment(1);
                if tokio::fs::try_exists(destination).await.unwrap_or(false) {
                    if let Err(rm) = tokio::fs::remove_file(destination).await {
                        warn!("Failed to remove partial download {}: {}", destination.display(), rm);
                    }
                }
                Err(e)
            }
        }
    }

    async fn fetch_resolved(&self, url: &str, destination: &Path) -> MediaResult<()> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        self.probe_head(url).await;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            metrics::counter!("reel_fetch_attempts_total").increment(1);

            match self.attempt(url, destination).await {
                Ok(transfer) => return self.verify(url, destination, transfer).await,
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Transport(message)) if attempt < self.config.max_attempts => {
                    let delay = self.config.backoff_for(attempt);
                    warn!(
                        url = %url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Download attempt failed, retrying: {}",
                        message
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(AttemptError::Transport(message)) => {
                    return Err(MediaError::download(url, attempt, message));
                }
            }
        }
    }

    fn is_drive(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .map(|host| self.config.drive_hosts.iter().any(|h| *h == host))
            .unwrap_or(false)
    }

    fn attempt_timeout(&self, url: &str) -> Duration {
        if self.is_drive(url) {
            self.config.drive_timeout
        } else {
            self.config.timeout
        }
    }

    /// Headers for a given URL: browser defaults plus host-specific extras.
    fn headers_for(&self, url: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let mut set = |name: &'static str, value: &'static str| {
            headers.insert(name, HeaderValue::from_static(value));
        };

        set("user-agent", BROWSER_USER_AGENT);
        set("accept", "video/*,image/*,*/*");
        set("accept-language", "en-US,en;q=0.9");
        set("accept-encoding", "identity");
        set("cache-control", "no-cache");
        set("pragma", "no-cache");

        let host = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string));
        if host.as_deref() == Some(REFERER_HOST) {
            set("referer", "https://test-videos.co.uk/");
        } else if self.is_drive(url) {
            set("accept", "*/*");
            set("sec-fetch-dest", "document");
            set("sec-fetch-mode", "navigate");
            set("sec-fetch-site", "none");
            set("upgrade-insecure-requests", "1");
        }

        headers
    }

    /// Informational HEAD request. Never fails the download.
    async fn probe_head(&self, url: &str) {
        let request = self.http.head(url).headers(self.headers_for(url)).send();
        match tokio::time::timeout(self.config.head_timeout, request).await {
            Ok(Ok(response)) => {
                let content_type = header_str(&response, CONTENT_TYPE.as_str());
                info!(
                    url = %url,
                    status = response.status().as_u16(),
                    final_url = %response.url(),
                    content_type = content_type.as_deref().unwrap_or("N/A"),
                    content_length = header_str(&response, CONTENT_LENGTH.as_str()).as_deref().unwrap_or("N/A"),
                    "HEAD probe"
                );
                if content_type.as_deref().is_some_and(is_document_content_type) {
                    warn!(url = %url, "HEAD reports an HTML page, proceeding with GET");
                }
            }
            Ok(Err(e)) => warn!(url = %url, "HEAD request failed: {}, proceeding with GET", e),
            Err(_) => warn!(url = %url, "HEAD request timed out, proceeding with GET"),
        }
    }

    async fn send_get(&self, url: &str, timeout: Duration) -> Result<Response, AttemptError> {
        let request = self.http.get(url).headers(self.headers_for(url)).send();
        let response = tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| AttemptError::Transport(format!("timed out after {}s", timeout.as_secs())))?
            .map_err(|e| AttemptError::Transport(e.to_string()))?;

        response
            .error_for_status()
            .map_err(|e| AttemptError::Transport(e.to_string()))
    }

    /// One GET, including the Drive confirmation re-issue.
    async fn attempt(&self, url: &str, destination: &Path) -> Result<Transfer, AttemptError> {
        let timeout = self.attempt_timeout(url);
        let mut response = self.send_get(url, timeout).await?;
        debug!(url = %url, final_url = %response.url(), "GET response");

        let mut content_type = header_str(&response, CONTENT_TYPE.as_str()).unwrap_or_default();

        if self.is_drive(url) && is_document_content_type(&content_type) {
            let prefix = read_prefix(response, CONFIRM_SCAN_BYTES, timeout).await?;
            if let Some(token) = find_confirm_token(&prefix) {
                let confirm_url = format!("{}&confirm={}", url, token);
                info!(url = %confirm_url, "Google Drive download confirmation detected, re-issuing");
                response = self.send_get(&confirm_url, self.config.timeout).await?;
                content_type = header_str(&response, CONTENT_TYPE.as_str()).unwrap_or_default();
            } else {
                return Err(AttemptError::Fatal(MediaError::UnexpectedContentType {
                    url: url.to_string(),
                    content_type,
                }));
            }
        }

        if is_document_content_type(&content_type) {
            return Err(AttemptError::Fatal(MediaError::UnexpectedContentType {
                url: url.to_string(),
                content_type,
            }));
        }

        let declared_size = response.content_length().filter(|n| *n > 0);
        info!(
            url = %url,
            content_type = %content_type,
            expected_bytes = declared_size.unwrap_or(0),
            "Streaming download"
        );

        let written = stream_to_file(response, destination, timeout, declared_size).await?;
        Ok(Transfer {
            declared_size,
            written,
        })
    }

    async fn verify(&self, url: &str, destination: &Path, transfer: Transfer) -> MediaResult<()> {
        let actual = tokio::fs::metadata(destination).await?.len();
        info!(url = %url, bytes = actual, path = %destination.display(), "Download finished");

        if actual == 0 || transfer.written == 0 {
            return Err(MediaError::EmptyContent { url: url.to_string() });
        }

        if let Some(expected) = transfer.declared_size {
            if expected.abs_diff(actual) > SIZE_TOLERANCE_BYTES {
                warn!(url = %url, expected, actual, "Size mismatch after download");
            }
        }

        let mut header = [0u8; 16];
        let mut file = tokio::fs::File::open(destination).await?;
        let n = file.read(&mut header).await?;
        debug!(path = %destination.display(), "File header (hex): {}", hex(&header[..n]));

        metrics::counter!("reel_fetch_bytes_total").increment(actual);
        Ok(())
    }
}

fn header_str(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Read up to `limit` bytes of a body, then drop the connection.
async fn read_prefix(response: Response, limit: usize, timeout: Duration) -> Result<Vec<u8>, AttemptError> {
    let mut stream = response.bytes_stream();
    let mut prefix = Vec::with_capacity(limit);

    while prefix.len() < limit {
        let next = tokio::time::timeout(timeout, stream.next())
            .await
            .map_err(|_| AttemptError::Transport("timed out reading response".to_string()))?;
        match next {
            Some(chunk) => {
                let chunk = chunk.map_err(|e| AttemptError::Transport(e.to_string()))?;
                let take = (limit - prefix.len()).min(chunk.len());
                prefix.extend_from_slice(&chunk[..take]);
            }
            None => break,
        }
    }

    Ok(prefix)
}

/// Stream a body to `destination`, returning bytes written.
async fn stream_to_file(
    response: Response,
    destination: &Path,
    timeout: Duration,
    declared_size: Option<u64>,
) -> Result<u64, AttemptError> {
    let mut file = tokio::fs::File::create(destination).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    let mut next_log = PROGRESS_LOG_INTERVAL;

    loop {
        let next = tokio::time::timeout(timeout, stream.next())
            .await
            .map_err(|_| AttemptError::Transport(format!("read stalled for {}s", timeout.as_secs())))?;
        let Some(chunk) = next else { break };
        let chunk = chunk.map_err(|e| AttemptError::Transport(e.to_string()))?;

        file.write_all(&chunk).await?;
        written += chunk.len() as u64;

        if written >= next_log {
            debug!("Downloaded: {}/{} bytes", written, declared_size.unwrap_or(0));
            next_log += PROGRESS_LOG_INTERVAL;
        }
    }

    file.flush().await?;
    Ok(written)
}
