//! Streaming download of the release artifact.
//!
//! The artifact is written straight over the destination path. The caller
//! must own a backup before calling [`ArtifactFetcher::fetch`]; this module
//! never restores anything and leaves a partial file behind on failure.

use crate::constants::DOWNLOAD_CHUNK_SIZE;
use crate::core::TransferError;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time::Instant;
use tracing::debug;

/// Bytes received so far and the declared total (`0` when unknown).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Bytes written to disk.
    pub bytes_received: u64,
    /// Declared `content-length`, or `0`.
    pub total_bytes: u64,
}

impl DownloadProgress {
    /// Completion percentage, if the total is known.
    pub fn percent(&self) -> Option<u64> {
        (self.total_bytes > 0).then(|| self.bytes_received.saturating_mul(100) / self.total_bytes)
    }
}

/// Rate limiter for progress callbacks.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl ProgressThrottle {
    /// Allow at most one emission per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    /// Whether an emission at `now` is allowed, recording it if so.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last_emit {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}

/// Fetches a remote artifact into a local file.
pub trait ArtifactFetcher {
    /// Stream `url` into `dest`, reporting progress, and return the bytes written.
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        on_progress: &mut (dyn FnMut(DownloadProgress) + Send),
    ) -> impl Future<Output = Result<u64, TransferError>> + Send;
}

/// HTTP [`ArtifactFetcher`].
///
/// Only connection establishment is time-limited. Large artifacts on slow
/// links are expected to take a while.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    progress_interval: Duration,
}

impl Downloader {
    /// Create a downloader with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(connect_timeout: Duration, progress_interval: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self::from_client(client, progress_interval))
    }

    /// Create a downloader that uses an existing client.
    pub fn from_client(client: reqwest::Client, progress_interval: Duration) -> Self {
        Self {
            client,
            progress_interval,
        }
    }

    /// Download `url` to `dest`.
    ///
    /// `on_progress` is called at most once per progress interval while data
    /// arrives, and once more after the file has been flushed.
    ///
    /// # Errors
    ///
    /// - [`TransferError::Request`] - connection failure or non-2xx status
    /// - [`TransferError::Interrupted`] - the body stream broke
    /// - [`TransferError::Incomplete`] - fewer bytes than `content-length`
    /// - [`TransferError::Write`] - the destination could not be written
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        on_progress: &mut (dyn FnMut(DownloadProgress) + Send),
    ) -> Result<u64, TransferError> {
        debug!("Downloading {} to {}", url, dest.display());

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|source| TransferError::Request {
                url: url.to_string(),
                source,
            })?;

        let total_bytes = response.content_length().unwrap_or(0);
        let write_error = |source| TransferError::Write {
            path: dest.to_path_buf(),
            source,
        };

        let file = File::create(dest).await.map_err(write_error)?;
        let mut writer = BufWriter::with_capacity(DOWNLOAD_CHUNK_SIZE, file);
        let mut throttle = ProgressThrottle::new(self.progress_interval);
        let mut bytes_received = 0u64;

        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(source) => {
                    // Keep what arrived on disk; the caller decides what to do with it.
                    let _ = writer.flush().await;
                    return Err(TransferError::Interrupted {
                        received: bytes_received,
                        source,
                    });
                }
            };

            writer.write_all(&chunk).await.map_err(write_error)?;
            bytes_received += chunk.len() as u64;

            if throttle.ready(Instant::now()) {
                on_progress(DownloadProgress {
                    bytes_received,
                    total_bytes,
                });
            }
        }

        writer.flush().await.map_err(write_error)?;
        writer.get_ref().sync_all().await.map_err(write_error)?;

        if total_bytes > 0 && bytes_received < total_bytes {
            return Err(TransferError::Incomplete {
                received: bytes_received,
                expected: total_bytes,
            });
        }

        on_progress(DownloadProgress {
            bytes_received,
            total_bytes,
        });
        debug!(bytes = bytes_received, "Download complete");
        Ok(bytes_received)
    }
}

impl ArtifactFetcher for Downloader {
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        on_progress: &mut (dyn FnMut(DownloadProgress) + Send),
    ) -> Result<u64, TransferError> {
        self.download(url, dest, on_progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestRoute, TestServer, test_client};
    use tempfile::TempDir;

    #[tokio::test(start_paused = true)]
    async fn test_throttle_limits_rate() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(1));
        let start = Instant::now();

        assert!(throttle.ready(start));
        assert!(!throttle.ready(start + Duration::from_millis(500)));
        assert!(throttle.ready(start + Duration::from_millis(1000)));
        assert!(!throttle.ready(start + Duration::from_millis(1999)));
        assert!(throttle.ready(start + Duration::from_secs(3)));
    }

    #[test]
    fn test_percent() {
        let progress = DownloadProgress {
            bytes_received: 40,
            total_bytes: 100,
        };
        assert_eq!(progress.percent(), Some(40));

        let unknown = DownloadProgress {
            bytes_received: 40,
            total_bytes: 0,
        };
        assert_eq!(unknown.percent(), None);
    }

    #[tokio::test]
    async fn test_download_writes_body_and_reports_completion() {
        let body = vec![7u8; 20_000];
        let server = TestServer::start().await;
        server.add_route("/ymu.exe", TestRoute::ok(body.clone()));
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("ymu.exe");
        std::fs::write(&dest, b"previous contents that are longer than nothing").unwrap();

        let downloader = Downloader::from_client(test_client(), Duration::from_secs(1));
        let mut reports: Vec<DownloadProgress> = Vec::new();
        let written = downloader
            .download(&server.url("/ymu.exe"), &dest, &mut |p: DownloadProgress| reports.push(p))
            .await
            .unwrap();

        assert_eq!(written, 20_000);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        let last = reports.last().unwrap();
        assert_eq!(last.bytes_received, 20_000);
        assert_eq!(last.total_bytes, 20_000);
        assert!(reports.windows(2).all(|w| w[0].bytes_received <= w[1].bytes_received));
    }

    #[tokio::test]
    async fn test_error_status_is_request_error() {
        let server = TestServer::start().await;
        server.add_route("/ymu.exe", TestRoute::status(404));
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("ymu.exe");
        std::fs::write(&dest, b"keep").unwrap();

        let downloader = Downloader::from_client(test_client(), Duration::from_secs(1));
        let err = downloader
            .download(&server.url("/ymu.exe"), &dest, &mut |_: DownloadProgress| {})
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Request { .. }));
        // Nothing was opened, so the destination is untouched.
        assert_eq!(std::fs::read(&dest).unwrap(), b"keep");
    }

    #[tokio::test]
    async fn test_truncated_body_fails() {
        let body = vec![1u8; 10_000];
        let server = TestServer::start().await;
        server.add_route("/ymu.exe", TestRoute::ok(body).cut_after(4_000));
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("ymu.exe");

        let downloader = Downloader::from_client(test_client(), Duration::from_secs(1));
        let err = downloader
            .download(&server.url("/ymu.exe"), &dest, &mut |_: DownloadProgress| {})
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TransferError::Interrupted { .. } | TransferError::Incomplete { .. }
        ));
    }
}
