//! Archive downloads with progress reporting, retries and cancellation.

use super::Source;
use crate::cancel::CancellationToken;
use crate::config::{AppConfig, NetworkConfig};
use crate::{LauncherError, Result};
use futures::StreamExt;
use reqwest::{Client, Response};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

const FILE_CHUNK_SIZE: usize = 64 * 1024;

/// Progress information for a download.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    /// Bytes downloaded so far.
    pub bytes_downloaded: u64,
    /// Total bytes, when the source announces it.
    pub total_bytes: Option<u64>,
}

impl DownloadProgress {
    /// Completed fraction in `[0, 1]`, only when the total size is known.
    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => None,
            Some(total) => Some((self.bytes_downloaded as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

/// How a download ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Completed { bytes: u64 },
    Cancelled,
}

/// Downloads plugin archives to local files.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    retry_attempts: u32,
    retry_base_delay: Duration,
    read_timeout: Duration,
    progress_interval: Duration,
}

impl Downloader {
    /// Create a downloader with the default network settings.
    ///
    /// There is no overall deadline, so a large archive on a slow link may take
    /// as long as it needs. A body that stops delivering data for longer than
    /// the read timeout fails the download.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(NetworkConfig::CONNECT_TIMEOUT)
            .user_agent(AppConfig::USER_AGENT)
            .build()
            .map_err(|e| LauncherError::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry_attempts: NetworkConfig::DOWNLOAD_RETRY_ATTEMPTS,
            retry_base_delay: NetworkConfig::DOWNLOAD_RETRY_BASE_DELAY,
            read_timeout: NetworkConfig::DOWNLOAD_READ_TIMEOUT,
            progress_interval: NetworkConfig::DOWNLOAD_PROGRESS_INTERVAL,
        })
    }

    pub fn with_retry(mut self, attempts: u32, base_delay: Duration) -> Self {
        self.retry_attempts = attempts.max(1);
        self.retry_base_delay = base_delay;
        self
    }

    /// Longest wait for the next body chunk before giving up.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Download `url` into `destination`.
    ///
    /// `on_progress` is called at most once per progress interval, plus once
    /// at the start and once when the last byte is written.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
        mut on_progress: impl FnMut(DownloadProgress),
    ) -> Result<DownloadOutcome> {
        info!("Downloading {} to {}", url, destination.display());

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(|e| LauncherError::io_with_path(e, destination))?;

        let mut throttle = ProgressThrottle::new(self.progress_interval);
        let outcome = match Source::parse(url)? {
            Source::Http(parsed) => {
                let response = self.send_with_retry(url, parsed).await?;
                let total = response.content_length();
                let mut stream = response.bytes_stream();
                let mut downloaded: u64 = 0;
                throttle.report(downloaded, total, false, &mut on_progress);

                loop {
                    if cancel.is_cancelled() {
                        break DownloadOutcome::Cancelled;
                    }
                    let next = tokio::time::timeout(self.read_timeout, stream.next())
                        .await
                        .map_err(|_| LauncherError::RemoteFetch {
                            url: url.to_string(),
                            message: format!(
                                "No data received for {:?} after {} bytes",
                                self.read_timeout, downloaded
                            ),
                        })?;
                    let Some(chunk) = next else {
                        break DownloadOutcome::Completed { bytes: downloaded };
                    };
                    let chunk = chunk.map_err(|e| LauncherError::RemoteFetch {
                        url: url.to_string(),
                        message: format!("Error reading download chunk: {}", e),
                    })?;

                    file.write_all(&chunk)
                        .await
                        .map_err(|e| LauncherError::io_with_path(e, destination))?;
                    downloaded += chunk.len() as u64;
                    throttle.report(downloaded, total, false, &mut on_progress);
                }
            }
            Source::File(path) => {
                let mut source = tokio::fs::File::open(&path).await.map_err(|e| {
                    LauncherError::RemoteFetch {
                        url: url.to_string(),
                        message: format!("{}: {}", path.display(), e),
                    }
                })?;
                let total = source.metadata().await.ok().map(|m| m.len());
                let mut buffer = vec![0u8; FILE_CHUNK_SIZE];
                let mut downloaded: u64 = 0;
                throttle.report(downloaded, total, false, &mut on_progress);

                loop {
                    if cancel.is_cancelled() {
                        break DownloadOutcome::Cancelled;
                    }
                    let read = source
                        .read(&mut buffer)
                        .await
                        .map_err(|e| LauncherError::io_with_path(e, &path))?;
                    if read == 0 {
                        break DownloadOutcome::Completed { bytes: downloaded };
                    }

                    file.write_all(&buffer[..read])
                        .await
                        .map_err(|e| LauncherError::io_with_path(e, destination))?;
                    downloaded += read as u64;
                    throttle.report(downloaded, total, false, &mut on_progress);
                }
            }
        };

        file.flush()
            .await
            .map_err(|e| LauncherError::io_with_path(e, destination))?;

        if let DownloadOutcome::Completed { bytes } = outcome {
            throttle.finish(bytes, &mut on_progress);
            info!("Download complete: {} bytes", bytes);
        }
        Ok(outcome)
    }

    /// Send the GET request, retrying connection failures with backoff.
    ///
    /// An HTTP error status is final: retrying a 404 does not help.
    async fn send_with_retry(&self, raw: &str, url: url::Url) -> Result<Response> {
        let mut attempt = 1;
        loop {
            match self.client.get(url.clone()).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    return Err(LauncherError::RemoteFetch {
                        url: raw.to_string(),
                        message: format!("HTTP {}", response.status()),
                    })
                }
                Err(e) if attempt < self.retry_attempts && (e.is_connect() || e.is_timeout()) => {
                    let delay = self.retry_base_delay * 2u32.pow(attempt - 1);
                    warn!(
                        "Download attempt {} for {} failed: {}; retrying in {:?}",
                        attempt, raw, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(LauncherError::RemoteFetch {
                        url: raw.to_string(),
                        message: format!("Download failed after {} attempt(s): {}", attempt, e),
                    })
                }
            }
        }
    }
}

/// Rate-limits progress callbacks.
struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
    total: Option<u64>,
}

impl ProgressThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            total: None,
        }
    }

    fn report(
        &mut self,
        downloaded: u64,
        total: Option<u64>,
        force: bool,
        on_progress: &mut impl FnMut(DownloadProgress),
    ) {
        self.total = total;
        let due = self
            .last_emit
            .map(|last| last.elapsed() >= self.interval)
            .unwrap_or(true);

        if force || due {
            self.last_emit = Some(Instant::now());
            on_progress(DownloadProgress {
                bytes_downloaded: downloaded,
                total_bytes: total,
            });
        }
    }

    fn finish(&mut self, downloaded: u64, on_progress: &mut impl FnMut(DownloadProgress)) {
        debug!("Final progress report at {} bytes", downloaded);
        let total = self.total;
        self.report(downloaded, total, true, on_progress);
    }
}
