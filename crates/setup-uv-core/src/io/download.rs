//! Resumable downloads with bounded retries.
//!
//! Each attempt continues from the bytes already on disk via an HTTP `Range`
//! request. The retry loop carries a [`DownloadState`] between attempts.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, StatusCode, header};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download failed with status {status} for {url}")]
    Status { status: StatusCode, url: String },

    #[error("No data received for {0:?}")]
    Timeout(Duration),

    #[error("Download failed after {attempts} attempts. Last error: {last}")]
    Exhausted { attempts: u32, last: Box<DownloadError> },
}

impl DownloadError {
    /// Client errors are permanent, except timeouts and rate limiting.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => {
                !status.is_client_error()
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Exhausted { .. } => false,
            Self::Http(_) | Self::Io(_) | Self::Timeout(_) => true,
        }
    }
}

/// Attempt ceiling and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Longest wait for response headers or the next body chunk.
    pub socket_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(120),
            socket_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay after the zero-based `attempt` failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Progress carried across attempts of one download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadState {
    /// Bytes already on disk.
    pub downloaded: u64,
    /// Full size, once a response has told us.
    pub total: Option<u64>,
    /// Zero-based index of the current attempt.
    pub attempt: u32,
}

impl DownloadState {
    /// Pick up whatever a previous attempt left at `path`.
    pub async fn resume_from(path: &Path) -> Self {
        let downloaded = tokio::fs::metadata(path).await.map_or(0, |m| m.len());
        Self {
            downloaded,
            ..Self::default()
        }
    }

    /// `Range` header value for the next request, if resuming.
    pub fn range_header(&self) -> Option<String> {
        (self.downloaded > 0).then(|| format!("bytes={}-", self.downloaded))
    }

    pub fn is_complete(&self) -> bool {
        self.total.is_some_and(|t| self.downloaded >= t)
    }
}

#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    policy: RetryPolicy,
    token: Option<String>,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
            token: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Send `token` as a bearer credential on every request.
    pub fn with_token(mut self, token: Option<&str>) -> Self {
        self.token = token.filter(|t| !t.is_empty()).map(str::to_string);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Download `url` to `dest`, resuming any partial file already there.
    ///
    /// # Errors
    ///
    /// A permanent failure is returned as-is. Once every attempt has failed
    /// the last error is wrapped in [`DownloadError::Exhausted`].
    pub async fn download(&self, url: &str, dest: &Path) -> Result<DownloadState, DownloadError> {
        let mut state = DownloadState::resume_from(dest).await;
        if state.downloaded > 0 {
            info!("Found partial download, resuming from {} bytes", state.downloaded);
        }

        let mut last_error = None;
        while state.attempt < self.policy.max_attempts {
            info!(
                "Download attempt {}/{} ({} bytes downloaded)",
                state.attempt + 1,
                self.policy.max_attempts,
                state.downloaded
            );

            match self.attempt(url, dest, &mut state).await {
                Ok(()) => {
                    info!("Download completed: {} bytes", state.downloaded);
                    return Ok(state);
                }
                Err(e) => {
                    warn!("Download attempt {} failed: {e}", state.attempt + 1);
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    state.downloaded = tokio::fs::metadata(dest).await.map_or(0, |m| m.len());
                    debug!("Current download size: {} bytes", state.downloaded);
                    last_error = Some(e);
                }
            }

            if state.attempt + 1 < self.policy.max_attempts {
                let delay = self.policy.delay_for(state.attempt);
                info!("Waiting {} seconds before retry...", delay.as_secs());
                tokio::time::sleep(delay).await;
            }
            state.attempt += 1;
        }

        Err(match last_error {
            Some(last) => DownloadError::Exhausted {
                attempts: self.policy.max_attempts,
                last: Box::new(last),
            },
            None => DownloadError::Timeout(self.policy.socket_timeout),
        })
    }

    async fn attempt(
        &self,
        url: &str,
        dest: &Path,
        state: &mut DownloadState,
    ) -> Result<(), DownloadError> {
        let timeout = self.policy.socket_timeout;

        let mut request = self
            .client
            .get(url)
            .header(header::USER_AGENT, crate::USER_AGENT);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(range) = state.range_header() {
            debug!("Resuming download from byte {}", state.downloaded);
            request = request.header(header::RANGE, range);
        }

        let response = tokio::time::timeout(timeout, request.send())
            .await
            .map_err(|_| DownloadError::Timeout(timeout))??;

        let append = match response.status() {
            StatusCode::OK => {
                if state.downloaded > 0 {
                    warn!("Server returned 200 instead of 206, starting download from beginning");
                    state.downloaded = 0;
                }
                false
            }
            StatusCode::PARTIAL_CONTENT => true,
            status => {
                return Err(DownloadError::Status {
                    status,
                    url: url.to_string(),
                });
            }
        };

        if let Some(len) = response.content_length() {
            state.total = Some(if append { state.downloaded + len } else { len });
            debug!("Total file size: {len} bytes");
        }

        let mut file = if append {
            OpenOptions::new().append(true).open(dest).await?
        } else {
            File::create(dest).await?
        };

        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::time::timeout(timeout, stream.next())
                .await
                .map_err(|_| DownloadError::Timeout(timeout))?;
            let Some(chunk) = next else { break };
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            state.downloaded += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use tempfile::tempdir;

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            socket_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(0), Duration::from_secs(10));
        assert_eq!(p.delay_for(1), Duration::from_secs(20));
        assert_eq!(p.delay_for(3), Duration::from_secs(80));
        assert_eq!(p.delay_for(4), Duration::from_secs(120));
        assert_eq!(p.delay_for(40), Duration::from_secs(120));
    }

    #[test]
    fn client_errors_are_permanent_except_timeouts_and_throttling() {
        let status = |s: u16| DownloadError::Status {
            status: StatusCode::from_u16(s).unwrap(),
            url: String::new(),
        };
        assert!(!status(404).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(status(408).is_retryable());
        assert!(status(429).is_retryable());
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
    }

    #[tokio::test]
    async fn full_download() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/uv.tar.gz")
            .with_status(200)
            .with_body("hello world")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("uv.tar.gz");
        let state = Downloader::new(Client::new())
            .with_policy(quick(1))
            .download(&format!("{}/uv.tar.gz", server.url()), &dest)
            .await
            .unwrap();
        assert_eq!(state.downloaded, 11);
        assert!(state.is_complete());
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn partial_file_is_resumed_with_range() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/uv.tar.gz")
            .match_header("range", "bytes=6-")
            .with_status(206)
            .with_body("world")
            .expect(1)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("uv.tar.gz");
        std::fs::write(&dest, b"hello ").unwrap();

        let state = Downloader::new(Client::new())
            .with_policy(quick(2))
            .download(&format!("{}/uv.tar.gz", server.url()), &dest)
            .await
            .unwrap();
        m.assert_async().await;
        assert_eq!(state.total, Some(11));
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn ok_while_resuming_restarts_from_zero() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/uv.tar.gz")
            .with_status(200)
            .with_body("hello world")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("uv.tar.gz");
        std::fs::write(&dest, b"stale").unwrap();

        Downloader::new(Client::new())
            .with_policy(quick(1))
            .download(&format!("{}/uv.tar.gz", server.url()), &dest)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn not_found_fails_without_retry() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/missing.tar.gz")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let err = Downloader::new(Client::new())
            .with_policy(quick(5))
            .download(
                &format!("{}/missing.tar.gz", server.url()),
                &dir.path().join("x"),
            )
            .await
            .unwrap_err();
        m.assert_async().await;
        assert!(matches!(err, DownloadError::Status { status, .. } if status == StatusCode::NOT_FOUND));
        assert!(err.to_string().contains("/missing.tar.gz"));
    }

    #[tokio::test]
    async fn server_errors_retry_until_exhausted() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/flaky.tar.gz")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let err = Downloader::new(Client::new())
            .with_policy(quick(3))
            .download(
                &format!("{}/flaky.tar.gz", server.url()),
                &dir.path().join("x"),
            )
            .await
            .unwrap_err();
        m.assert_async().await;
        let msg = err.to_string();
        assert!(msg.starts_with("Download failed after 3 attempts. Last error:"), "{msg}");
        assert!(msg.contains("503"));
    }

    #[tokio::test]
    async fn throttling_is_retried() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/busy.tar.gz")
            .with_status(429)
            .expect(2)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let err = Downloader::new(Client::new())
            .with_policy(quick(2))
            .download(&format!("{}/busy.tar.gz", server.url()), &dir.path().join("x"))
            .await
            .unwrap_err();
        m.assert_async().await;
        assert!(matches!(err, DownloadError::Exhausted { attempts: 2, .. }));
    }
}
