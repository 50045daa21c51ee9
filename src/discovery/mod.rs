//! Manifest discovery
//!
//! This module finds and walks the manifest that describes a source:
//! - Priority-race probing of well-known entry points, with a robots.txt
//!   `Sitemap:` fallback ([`Resolver`])
//! - The nested-manifest batch walk under a global [`Budget`] ([`Walker`])

mod budget;
mod probe;
mod walk;

pub use budget::Budget;
pub use probe::race_probes;
pub use walk::{Leaf, WalkReport, Walker};

use crate::cancel::CancelToken;
use crate::crawler::{Fetcher, Retrier};
use crate::manifest::ManifestKind;
use crate::robots::{robots_url, RobotsCache};
use crate::url::canonicalize;
use crate::HarvestError;
use std::sync::Arc;
use tracing::info;

/// A candidate entry point, probed relative to the source's base locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryProbe {
    pub path: &'static str,
    pub name: &'static str,
    /// Lower value means higher priority
    pub priority: u8,
    /// Shape the response body must have
    pub kind: ManifestKind,
}

/// Entry points tried for every source without a configured manifest kind
pub const DEFAULT_PROBES: &[DiscoveryProbe] = &[
    DiscoveryProbe {
        path: "/llms.txt",
        name: "llms",
        priority: 0,
        kind: ManifestKind::Llms,
    },
    DiscoveryProbe {
        path: "/sitemap.xml",
        name: "sitemap",
        priority: 1,
        kind: ManifestKind::Sitemap,
    },
    DiscoveryProbe {
        path: "/sitemap-0.xml",
        name: "sitemap-nextjs",
        priority: 1,
        kind: ManifestKind::Sitemap,
    },
    DiscoveryProbe {
        path: "/search/search_index.json",
        name: "mkdocs-search",
        priority: 2,
        kind: ManifestKind::SearchIndex,
    },
];

/// Method recorded when a `Sitemap:` directive in robots.txt won
pub const ROBOTS_METHOD: &str = "robots";

/// Method recorded when the manifest kind came from configuration
pub const CONFIGURED_METHOD: &str = "configured";

/// The manifest chosen for a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryResult {
    /// Canonical locator of the manifest
    pub resolved_url: String,
    /// Probe name or indirection that produced the result
    pub method: String,
    pub kind: ManifestKind,
}

impl DiscoveryResult {
    /// Wraps a locator whose manifest kind is known up front
    pub fn configured(url: &str, kind: ManifestKind) -> Result<Self, HarvestError> {
        Ok(Self {
            resolved_url: canonicalize(url)?,
            method: CONFIGURED_METHOD.to_string(),
            kind,
        })
    }
}

/// Resolves a source's base locator to a concrete manifest
#[derive(Clone)]
pub struct Resolver {
    fetcher: Arc<dyn Fetcher>,
    retrier: Retrier,
    robots: Arc<RobotsCache>,
    probes: Vec<DiscoveryProbe>,
}

impl Resolver {
    pub fn new(fetcher: Arc<dyn Fetcher>, retrier: Retrier, robots: Arc<RobotsCache>) -> Self {
        Self {
            fetcher,
            retrier,
            robots,
            probes: DEFAULT_PROBES.to_vec(),
        }
    }

    /// Replaces the probe table
    pub fn with_probes(mut self, probes: Vec<DiscoveryProbe>) -> Self {
        self.probes = probes;
        self
    }

    pub fn probes(&self) -> &[DiscoveryProbe] {
        &self.probes
    }

    /// Finds the manifest for `base`
    ///
    /// All probes are fetched concurrently and the highest-priority success
    /// is kept. robots.txt is then consulted; its first `Sitemap:` directive
    /// takes precedence over the probe result. With neither, the source has
    /// no usable manifest and [`HarvestError::NoSourceFound`] is returned.
    pub async fn discover(
        &self,
        cancel: &CancelToken,
        base: &str,
    ) -> Result<DiscoveryResult, HarvestError> {
        let base = canonicalize(base)?;

        let probed = race_probes(
            Arc::clone(&self.fetcher),
            &self.retrier,
            cancel,
            &base,
            &self.probes,
        )
        .await?;

        cancel.check()?;
        let robots = self.robots.get(self.fetcher.as_ref(), cancel, &base).await?;
        let robots_base = robots_url(&base).unwrap_or_else(|| base.clone());
        if let Some(sitemap) = robots.sitemaps(&robots_base).into_iter().next() {
            let resolved_url = canonicalize(&sitemap)?;
            info!("Using robots.txt sitemap {} for {}", resolved_url, base);
            return Ok(DiscoveryResult {
                resolved_url,
                method: ROBOTS_METHOD.to_string(),
                kind: ManifestKind::Sitemap,
            });
        }

        match probed {
            Some(result) => {
                info!(
                    "Discovered {} manifest {} for {} via {}",
                    result.kind, result.resolved_url, base, result.method
                );
                Ok(result)
            }
            None => Err(HarvestError::NoSourceFound { url: base }),
        }
    }
}
