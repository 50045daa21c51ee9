use crate::crawler::RetryConfig;
use crate::manifest::ManifestKind;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Sumi-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceConfig>,
}

/// Run-wide harvest behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HarvestConfig {
    /// Maximum number of leaves fetched at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Global cap on leaves dispatched across all sources
    #[serde(default)]
    pub max_items: Option<usize>,

    /// Path of the incremental-sync ledger file
    pub ledger_path: String,

    /// Directory the file sink writes into
    pub output_dir: String,
}

fn default_concurrency() -> usize {
    8
}

/// HTTP client settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FetchConfig {
    /// Per-fetch timeout in seconds
    pub timeout_secs: u64,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: format!("sumi-harvest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Retry schedule as written in the config file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Fraction of the delay randomized in either direction
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            multiplier: defaults.multiplier,
            jitter: defaults.jitter,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        RetryConfig {
            max_attempts: settings.max_attempts,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            multiplier: settings.multiplier,
            jitter: settings.jitter,
        }
    }
}

/// One documentation source to harvest
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    /// Base locator, or the manifest itself when `kind` is set
    pub url: String,

    /// Skips discovery and treats `url` as a manifest of this kind
    #[serde(default)]
    pub kind: Option<ManifestKind>,

    /// Host patterns (e.g., "docs.example.com" or "*.example.com") leaves
    /// must match; empty allows every host
    #[serde(default)]
    pub allowed_domains: Vec<String>,
}
