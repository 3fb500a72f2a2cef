use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::fmt;
use std::time::Duration;

use crate::errors::AppError;
use crate::retry::RetryPolicy;

/// Desktop browser user agent sent with every page fetch.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

/// Why a single GET failed.
#[derive(Debug)]
pub enum FetchError {
    /// Network-level failure (connect, timeout, body read). Retryable.
    Transport(reqwest::Error),
    /// The server answered with a 4xx/5xx status. Not retried.
    Http { status: u16, url: String },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transport(_))
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Transport(e) => write!(f, "Transport error: {}", e),
            FetchError::Http { status, url } => write!(f, "HTTP {} for {}", status, url),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(err)
    }
}

/// Single-page HTTP fetcher with a per-request timeout and transport-level retries.
#[derive(Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
    timeout: Duration,
    retry: RetryPolicy,
}

impl PageFetcher {
    /// Creates a fetcher with its own client.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Per-request timeout.
    /// * `retry` - Policy applied to transport failures.
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::InternalError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            timeout,
            retry,
        })
    }

    /// Shared client, reused by the robots cache.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetches `url` as text, or `None` if every attempt failed.
    pub async fn fetch(&self, url: &str) -> Option<String> {
        match self.try_fetch(url).await {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::debug!("Failed to fetch {}: {}", url, e);
                None
            }
        }
    }

    /// Fetches `url`, retrying transport errors according to the policy.
    pub async fn try_fetch(&self, url: &str) -> Result<String, FetchError> {
        self.retry
            .run(|| self.get_once(url), FetchError::is_transient)
            .await
    }

    async fn get_once(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            tracing::warn!("HTTP {} for {}", status.as_u16(), url);
            return Err(FetchError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}
