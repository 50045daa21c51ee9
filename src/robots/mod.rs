//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching
//! robots.txt files. Leaves disallowed for the configured user agent are
//! never fetched, and `Sitemap:` directives feed manifest discovery.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache};
pub use parser::ParsedRobots;

use crate::cancel::CancelToken;
use crate::crawler::{FetchError, Fetcher};
use crate::url::resolve_relative;
use crate::HarvestError;

/// Returns the robots.txt location for the origin of `url`
///
/// ```
/// use sumi_harvest::robots::robots_url;
///
/// assert_eq!(
///     robots_url("https://example.com:8443/docs/page").as_deref(),
///     Some("https://example.com:8443/robots.txt")
/// );
/// ```
pub fn robots_url(url: &str) -> Option<String> {
    resolve_relative(url, "/robots.txt").ok()
}

/// Fetches and parses the robots.txt at `robots_url`
///
/// A missing file, a non-success status or a transport error all yield an
/// allow-all policy; only cancellation is an error.
pub async fn fetch_robots(
    fetcher: &dyn Fetcher,
    cancel: &CancelToken,
    robots_url: &str,
) -> Result<ParsedRobots, HarvestError> {
    match fetcher.fetch(cancel, robots_url, &[]).await {
        Ok(response) if response.is_success() => {
            tracing::debug!("Fetched robots.txt from {}", robots_url);
            Ok(ParsedRobots::from_content(&response.text()))
        }
        Ok(response) => {
            tracing::debug!(
                "No robots.txt at {} (HTTP {}), allowing all",
                robots_url,
                response.status
            );
            Ok(ParsedRobots::allow_all())
        }
        Err(FetchError::Cancelled) => Err(HarvestError::Cancelled),
        Err(e) => {
            tracing::debug!("Failed to fetch {}: {}, allowing all", robots_url, e);
            Ok(ParsedRobots::allow_all())
        }
    }
}
