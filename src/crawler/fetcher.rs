//! HTTP fetcher implementation
//!
//! This module defines the fetch collaborator seam used by every component
//! that talks to a remote source, including:
//! - The [`Fetcher`] trait: `fetch(url, headers) -> status, headers, body`
//! - [`FetchError`] and its retry classification
//! - [`HttpFetcher`], the reqwest-backed implementation
//!
//! The core never looks at transport details beyond this shape; TLS and
//! user-agent concerns stay inside the fetcher.

use crate::cancel::CancelToken;
use crate::config::FetchConfig;
use crate::crawler::retry::Retryable;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Maximum number of redirects followed by [`HttpFetcher`]
const MAX_REDIRECTS: usize = 10;

/// Errors produced by a single fetch attempt
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("HTTP {status} for {url}")]
    Status {
        url: String,
        status: u16,
        /// Parsed `Retry-After` header, when the server sent one
        retry_after: Option<Duration>,
    },

    #[error("Request cancelled")]
    Cancelled,
}

impl FetchError {
    /// Returns the HTTP status code, if this is a status error
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => is_retryable_status(*status),
            Self::Cancelled => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Returns true for HTTP statuses worth retrying
///
/// | Status | Meaning |
/// |--------|---------|
/// | 429 | Too many requests |
/// | 502, 503, 504 | Gateway / availability errors |
/// | 520–530 | CDN origin errors |
///
/// Every other status, including 500 and all other 4xx, is permanent.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 502 | 503 | 504 | 520..=530)
}

/// Parses a `Retry-After` value given as an integer number of seconds
///
/// HTTP-date values are not supported and yield `None`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// A raw response from the fetch collaborator
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final URL after redirects
    pub url: String,
    /// HTTP status code
    pub status: u16,
    /// Response headers; names are lowercase
    pub headers: HashMap<String, Vec<String>>,
    /// Response body
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Returns the first value of a header (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Returns the Content-Type header
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Returns the body decoded as UTF-8 (lossy)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Returns true for 2xx statuses
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Converts a non-2xx response into [`FetchError::Status`]
    pub fn error_for_status(self) -> Result<Self, FetchError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(FetchError::Status {
                retry_after: self.header("retry-after").and_then(parse_retry_after),
                url: self.url,
                status: self.status,
            })
        }
    }
}

/// The fetch collaborator
///
/// Implementations return the response for any HTTP status; only transport
/// failures are errors. Implementations must return promptly once `cancel`
/// fires.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        cancel: &CancelToken,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<FetchResponse, FetchError>;
}

/// Builds an HTTP client with the configured user agent and timeouts
///
/// # Example
///
/// ```no_run
/// use sumi_harvest::config::FetchConfig;
/// use sumi_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&FetchConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed [`Fetcher`]
///
/// The request timeout applies per fetch and is independent of the run's
/// cancellation token.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Creates a fetcher from the fetch configuration
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Wraps an existing client
    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn send(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<FetchResponse, FetchError> {
        let mut request = self.client.get(url).timeout(self.timeout);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| classify(url, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        let mut header_map: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                header_map
                    .entry(name.as_str().to_ascii_lowercase())
                    .or_default()
                    .push(value.to_string());
            }
        }

        let body = response.bytes().await.map_err(|e| classify(url, e))?;

        Ok(FetchResponse {
            url: final_url,
            status,
            headers: header_map,
            body: body.to_vec(),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        cancel: &CancelToken,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<FetchResponse, FetchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.send(url, headers) => result,
        }
    }
}

/// Maps a reqwest error onto the fetch error taxonomy
fn classify(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
