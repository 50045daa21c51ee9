//! Robots.txt caching implementation
//!
//! This module provides a per-origin cache of robots.txt files, including
//! automatic expiration after 24 hours.

use crate::cancel::CancelToken;
use crate::crawler::Fetcher;
use crate::robots::{fetch_robots, robots_url, ParsedRobots};
use crate::HarvestError;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Cached robots.txt data for an origin
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed robots.txt content
    pub content: Arc<ParsedRobots>,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    /// Creates a new CachedRobots instance with the current timestamp
    pub fn new(content: ParsedRobots) -> Self {
        Self {
            content: Arc::new(content),
            fetched_at: Utc::now(),
        }
    }

    /// Checks if the cached robots.txt is stale (older than 24 hours)
    pub fn is_stale(&self) -> bool {
        self.age() > Duration::hours(24)
    }

    /// Returns the age of the cached robots.txt
    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}

/// Slot holding one origin's robots.txt once fetched
type OriginSlot = Arc<Mutex<Option<CachedRobots>>>;

/// Per-origin robots.txt cache shared by discovery and leaf processing
///
/// Each origin has its own slot lock, held across that origin's fetch so
/// concurrent leaves of one origin trigger a single robots.txt request. The
/// map lock is only held long enough to find the slot, so a slow origin
/// never blocks lookups for another.
#[derive(Debug, Default)]
pub struct RobotsCache {
    entries: std::sync::Mutex<HashMap<String, OriginSlot>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> OriginSlot {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(entries.entry(key.to_string()).or_default())
    }

    /// Returns the robots.txt governing `url`, fetching it when missing or
    /// stale
    ///
    /// Fetch failures other than cancellation yield an allow-all policy.
    pub async fn get(
        &self,
        fetcher: &dyn Fetcher,
        cancel: &CancelToken,
        url: &str,
    ) -> Result<Arc<ParsedRobots>, HarvestError> {
        let Some(key) = robots_url(url) else {
            return Ok(Arc::new(ParsedRobots::allow_all()));
        };

        let slot = self.slot(&key);
        let mut cached = slot.lock().await;
        if let Some(entry) = cached.as_ref() {
            if !entry.is_stale() {
                return Ok(Arc::clone(&entry.content));
            }
            tracing::debug!("Robots.txt for {} is stale, refetching", key);
        }

        let parsed = fetch_robots(fetcher, cancel, &key).await?;
        let entry = CachedRobots::new(parsed);
        let content = Arc::clone(&entry.content);
        *cached = Some(entry);
        Ok(content)
    }

    /// Checks whether `url` may be fetched by `user_agent`
    pub async fn is_allowed(
        &self,
        fetcher: &dyn Fetcher,
        cancel: &CancelToken,
        url: &str,
        user_agent: &str,
    ) -> Result<bool, HarvestError> {
        Ok(self.get(fetcher, cancel, url).await?.is_allowed(url, user_agent))
    }

    /// Number of origins with a fetched robots.txt
    pub async fn len(&self) -> usize {
        let slots: Vec<OriginSlot> = {
            let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.values().cloned().collect()
        };

        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
