//! Sumi-Harvest: an incremental documentation harvester
//!
//! This crate discovers documentation manifests (llms.txt, sitemaps, mkdocs
//! search indexes, plain link lists), walks them under a global item budget,
//! fetches every entry with bounded concurrency and classified retries, and
//! keeps a ledger of content fingerprints so repeated runs only touch pages
//! that changed.

pub mod cancel;
pub mod config;
pub mod crawler;
pub mod discovery;
pub mod manifest;
pub mod output;
pub mod robots;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Malformed locator: {0}")]
    Malformed(#[from] UrlError),

    #[error("Transient failure for {url} after {attempts} attempts: {source}")]
    Transient {
        url: String,
        attempts: u32,
        source: crawler::FetchError,
    },

    #[error("Permanent failure for {url}: {source}")]
    Permanent {
        url: String,
        source: crawler::FetchError,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Index unavailable at {url}: {reason}")]
    IndexUnavailable { url: String, reason: String },

    #[error("No manifest found for {url}")]
    NoSourceFound { url: String },

    #[error("Manifest parse error for {url}: {message}")]
    ManifestParse { url: String, message: String },

    #[error("Ledger error: {0}")]
    Ledger(#[from] state::LedgerError),

    #[error("Processor error for {url}: {message}")]
    Processor { url: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl HarvestError {
    /// Returns true if this error is the propagated cancellation signal
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Ledger(state::LedgerError::Cancelled)
        )
    }

    /// Converts a retry executor failure for `url` into the harvest taxonomy
    pub fn from_retry(url: &str, err: crawler::RetryError<crawler::FetchError>) -> Self {
        match err {
            crawler::RetryError::Cancelled => Self::Cancelled,
            crawler::RetryError::Permanent(source) => {
                if matches!(source, crawler::FetchError::Cancelled) {
                    Self::Cancelled
                } else {
                    Self::Permanent {
                        url: url.to_string(),
                        source,
                    }
                }
            }
            crawler::RetryError::Exhausted { attempts, last } => Self::Transient {
                url: url.to_string(),
                attempts,
                source: last,
            },
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Malformed(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use config::Config;
pub use state::{Ledger, PageState};
pub use url::{canonicalize, resolve_relative, same_origin, same_registrable_domain};
