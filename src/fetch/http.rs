//! HTTP client for source pages and images

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::limiter::RateLimiter;
use super::retry::{ErrorClass, RetryError, RetryPolicy};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to read body: {0}")]
    Body(String),

    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// 429 and 5xx responses are worth retrying, other 4xx are not.
    pub fn class(&self) -> ErrorClass {
        match self {
            FetchError::Timeout(_)
            | FetchError::Connect(_)
            | FetchError::Request(_)
            | FetchError::Body(_) => ErrorClass::Transient,
            FetchError::Status { status, .. } if *status == 429 || *status >= 500 => {
                ErrorClass::Transient
            }
            FetchError::Status { .. } | FetchError::InvalidUrl(_) | FetchError::Cancelled => {
                ErrorClass::Terminal
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Outcome of a rate-limited, retried fetch
pub type FetchResult<T> = std::result::Result<T, RetryError<FetchError>>;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            user_agent: "MangaBox/0.1.0".to_string(),
        }
    }
}

/// Single-attempt HTTP GET. Never used directly by source adapters; see
/// [`PoliteClient`].
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;

        Ok(Self { client })
    }

    pub async fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<Bytes> {
        let parsed = url::Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
        debug!(url, "Starting request");

        let mut request = self.client.get(parsed);
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(url.to_string())
            } else if e.is_connect() {
                FetchError::Connect(e.to_string())
            } else {
                FetchError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(url.to_string())
            } else {
                FetchError::Body(e.to_string())
            }
        })?;

        debug!(url, size = bytes.len(), "Request completed");
        Ok(bytes)
    }
}

/// The only way adapters reach the network: every attempt waits for the
/// source's rate-limit grant, and every request runs under the retry policy.
#[derive(Clone)]
pub struct PoliteClient {
    http: Arc<HttpClient>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl PoliteClient {
    pub fn new(http: Arc<HttpClient>, limiter: Arc<RateLimiter>, retry: RetryPolicy) -> Self {
        Self {
            http,
            limiter,
            retry,
            cancel: CancellationToken::new(),
        }
    }

    /// Same client bound to a run's cancellation signal
    pub fn with_cancellation(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn get(
        &self,
        source_id: &str,
        url: &str,
        headers: &[(&str, String)],
    ) -> FetchResult<Bytes> {
        let attempt = move || async move {
            self.limiter
                .acquire(source_id, &self.cancel)
                .await
                .map_err(|_| FetchError::Cancelled)?;
            self.http.get(url, headers).await
        };

        match self.retry.execute(attempt, FetchError::class, &self.cancel).await {
            Err(RetryError::Terminal(FetchError::Cancelled)) => Err(RetryError::Cancelled),
            other => other,
        }
    }

    pub async fn get_text(&self, source_id: &str, url: &str) -> FetchResult<String> {
        let bytes = self.get(source_id, url, &[]).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
