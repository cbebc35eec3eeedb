//! HTTP fetching with bounded retry.
//!
//! [`Fetcher`] wraps an [`HttpClient`] and applies the retry policy:
//!
//! - transport failures and unexpected status codes are retried up to
//!   [`RetryPolicy::max_attempts`] times, sleeping `attempt * backoff_unit`
//!   between attempts (linear backoff)
//! - 401, 403 and 404 fail on the first attempt with
//!   [`BootstrapError::PermanentHttp`]
//! - local write failures while streaming a download are not retried
//!
//! Streamed downloads are written to a `.part` file next to the destination
//! and renamed into place only once the whole body has arrived.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::errors::{BootstrapError, IoContext, Result};

/// Default number of attempts for a single request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// Default backoff step between attempts.
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Timeout for metadata and other small requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for streamed artifact downloads.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// User-Agent header sent with every request.
const USER_AGENT: &str = concat!("toolboot/", env!("CARGO_PKG_VERSION"));

/// A buffered HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns the body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Failure of a single request attempt, before retry classification.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be completed: connection refused, reset,
    /// timed out, body interrupted. Retryable.
    #[error("{0}")]
    Network(String),

    /// The response body could not be written locally. Not retryable.
    #[error("failed to write {}", path.display())]
    Io {
        /// The file being written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Minimal HTTP GET capability used by the bootstrapper.
///
/// Implementations perform exactly one attempt per call; retries are the
/// [`Fetcher`]'s job.
#[allow(async_fn_in_trait)]
pub trait HttpClient {
    /// Performs a GET request and buffers the body.
    async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> std::result::Result<HttpResponse, TransportError>;

    /// Performs a GET request and streams a successful body into `dest`,
    /// creating or truncating it. Non-success bodies are discarded and `dest`
    /// is not touched. Returns the status code.
    async fn download(&self, url: &str, dest: &Path) -> std::result::Result<u16, TransportError>;
}

/// Timeouts and headers for [`ReqwestClient`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Per-request timeout for buffered requests.
    pub request_timeout: Duration,
    /// Per-request timeout for streamed downloads.
    pub download_timeout: Duration,
    /// User-Agent header value.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// [`HttpClient`] backed by `reqwest`.
///
/// Proxy settings are taken from the standard environment variables.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
    config: HttpConfig,
}

impl ReqwestClient {
    /// Builds a client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be constructed.
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| BootstrapError::ClientSetup {
                message: error_chain(&e),
            })?;
        Ok(Self { client, config })
    }
}

impl HttpClient for ReqwestClient {
    async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> std::result::Result<HttpResponse, TransportError> {
        let url = reqwest::Url::parse_with_params(url, query)
            .map_err(|e| TransportError::Network(format!("invalid URL {url}: {e}")))?;

        let response = self
            .client
            .get(url)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| TransportError::Network(error_chain(&e)))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(error_chain(&e)))?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }

    async fn download(&self, url: &str, dest: &Path) -> std::result::Result<u16, TransportError> {
        let response = self
            .client
            .get(url)
            .timeout(self.config.download_timeout)
            .send()
            .await
            .map_err(|e| TransportError::Network(error_chain(&e)))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Ok(status);
        }

        let io_error = |source| TransportError::Io {
            path: dest.to_path_buf(),
            source,
        };

        let mut file = tokio::fs::File::create(dest).await.map_err(io_error)?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| TransportError::Network(error_chain(&e)))?;
            file.write_all(&chunk).await.map_err(io_error)?;
            downloaded += chunk.len() as u64;
        }

        file.flush().await.map_err(io_error)?;
        file.sync_all().await.map_err(io_error)?;

        tracing::debug!(url, bytes = downloaded, "download complete");
        Ok(status)
    }
}

/// Bounded retry with linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Sleep after attempt `n` is `n * backoff_unit`.
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given (1-based) failed attempt.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt)
    }
}

/// Result of one attempt, as seen by the retry loop.
enum Attempt<T> {
    Done(T),
    Retry(String),
    Fail(BootstrapError),
}

/// HTTP fetcher applying a [`RetryPolicy`] to an [`HttpClient`].
#[derive(Debug, Clone)]
pub struct Fetcher<C> {
    client: C,
    policy: RetryPolicy,
}

impl<C: HttpClient> Fetcher<C> {
    /// Creates a fetcher.
    #[must_use]
    pub fn new(client: C, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Returns the wrapped client.
    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Fetches `url` and returns the successful (2xx) response.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::PermanentHttp`] for 401/403/404 and
    /// [`BootstrapError::TransientNetwork`] once the retry bound is exhausted.
    pub async fn fetch(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpResponse> {
        let client = &self.client;
        self.retry(url, || async move {
            match client.get(url, query).await {
                Ok(response) => match classify(url, response.status) {
                    None => Attempt::Done(response),
                    Some(outcome) => outcome,
                },
                Err(e) => Attempt::Retry(e.to_string()),
            }
        })
        .await
    }

    /// Streams `url` into `dest`.
    ///
    /// `dest` only appears once the body has been received completely; a
    /// failed attempt leaves no file behind.
    ///
    /// # Errors
    ///
    /// Same classification as [`Fetcher::fetch`]; local write failures are
    /// returned as [`BootstrapError::Filesystem`] without retrying.
    pub async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<()> {
        let client = &self.client;
        let part_buf = part_path(dest);
        let part = part_buf.as_path();

        self.retry(url, || async move {
            let outcome = match client.download(url, part).await {
                Ok(status) => match classify(url, status) {
                    None => Attempt::Done(()),
                    Some(outcome) => outcome,
                },
                Err(TransportError::Network(message)) => Attempt::Retry(message),
                Err(TransportError::Io { path, source }) => Attempt::Fail(
                    BootstrapError::filesystem(format!("failed to write {}", path.display()), source),
                ),
            };
            if !matches!(outcome, Attempt::Done(())) {
                let _ = tokio::fs::remove_file(part).await;
            }
            outcome
        })
        .await?;

        tokio::fs::rename(part, dest)
            .await
            .fs_context(|| format!("failed to rename {} to {}", part.display(), dest.display()))
    }

    async fn retry<T, F, Fut>(&self, url: &str, mut attempt_once: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match attempt_once().await {
                Attempt::Done(value) => return Ok(value),
                Attempt::Fail(e) => return Err(e),
                Attempt::Retry(message) => {
                    if attempt < max_attempts {
                        let delay = self.policy.delay_after(attempt);
                        tracing::warn!(
                            url,
                            attempt,
                            max_attempts,
                            error = %message,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "request failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = message;
                }
            }
        }

        Err(BootstrapError::TransientNetwork {
            url: url.to_string(),
            attempts: max_attempts,
            message: last_error,
        })
    }
}

/// Maps a status code to a retry decision; `None` means success.
fn classify<T>(url: &str, status: u16) -> Option<Attempt<T>> {
    match status {
        200..=299 => None,
        401 | 403 | 404 => Some(Attempt::Fail(BootstrapError::PermanentHttp {
            url: url.to_string(),
            status,
        })),
        _ => Some(Attempt::Retry(format!("HTTP {status}"))),
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Formats an error together with its source chain.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
