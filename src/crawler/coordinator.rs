//! Harvest coordinator - main run orchestration logic
//!
//! This module drives a whole run:
//! - Loading the ledger (unless the run is fresh)
//! - Resolving every configured source to a manifest
//! - Walking each manifest under one global item budget
//! - Fetching, fingerprinting and processing every leaf
//! - Pruning and saving the ledger, and reporting statistics

use crate::cancel::CancelToken;
use crate::config::{Config, SourceConfig};
use crate::crawler::{fetch_with_retry, Fetcher, HttpFetcher, Retrier, RetryConfig};
use crate::discovery::{Budget, DiscoveryResult, Leaf, Resolver, WalkReport, Walker};
use crate::output::{
    FileSink, HarvestStats, LeafCounters, LeafDocument, Processor, SourceReport,
};
use crate::robots::RobotsCache;
use crate::state::{content_hash, Ledger, PageState};
use crate::url::host_allowed;
use crate::HarvestError;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

/// Run-level switches that do not belong in the config file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestOptions {
    /// Ignore the ledger on disk and treat every leaf as new
    pub fresh: bool,
    /// Drop ledger records for pages no source listed this run
    pub prune: bool,
}

/// Main harvest coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    options: HarvestOptions,
    fetcher: Arc<dyn Fetcher>,
    processor: Arc<dyn Processor>,
    retrier: Retrier,
    robots: Arc<RobotsCache>,
    ledger: Arc<Ledger>,
}

impl Coordinator {
    /// Creates a coordinator with the HTTP fetcher and the file sink
    pub fn new(config: Config, options: HarvestOptions) -> Result<Self, HarvestError> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&config.fetch)?);
        let processor: Arc<dyn Processor> =
            Arc::new(FileSink::new(&config.harvest.output_dir));
        Ok(Self::with_parts(config, options, fetcher, processor))
    }

    /// Creates a coordinator around caller-supplied collaborators
    pub fn with_parts(
        config: Config,
        options: HarvestOptions,
        fetcher: Arc<dyn Fetcher>,
        processor: Arc<dyn Processor>,
    ) -> Self {
        let retrier = Retrier::new(RetryConfig::from(&config.retry));
        let ledger = Arc::new(Ledger::new(&config.harvest.ledger_path));
        Self {
            config: Arc::new(config),
            options,
            fetcher,
            processor,
            retrier,
            robots: Arc::new(RobotsCache::new()),
            ledger,
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Runs the harvest over every configured source
    ///
    /// A source that cannot be resolved, a manifest that cannot be fetched
    /// and a leaf that fails are all counted in the returned statistics; none
    /// of them stops the run. Cancellation stops the run, saves the ledger
    /// with whatever was recorded so far and returns
    /// [`HarvestError::Cancelled`].
    pub async fn run(&self, cancel: &CancelToken) -> Result<HarvestStats, HarvestError> {
        let start_time = Instant::now();
        let mut stats = HarvestStats::default();

        if self.options.fresh {
            info!("Starting fresh harvest (ignoring existing ledger)");
        } else {
            self.ledger.load(cancel).await?;
            info!(
                "Loaded {} ledger entries from {}",
                self.ledger.len(),
                self.ledger.path().display()
            );
        }

        let budget = Budget::from_limit(self.config.harvest.max_items);
        let counters = Arc::new(LeafCounters::default());
        let mut cancelled = false;

        for source in &self.config.sources {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if budget.is_exhausted() {
                info!("Item limit reached, skipping remaining sources");
                stats.budget_exhausted = true;
                break;
            }

            info!("Harvesting source {}", source.url);
            match self.harvest_source(cancel, source, &budget, &counters).await {
                Ok((resolved, report)) => {
                    stats.sources_resolved += 1;
                    stats.record_walk(&report);
                    stats.sources.push(SourceReport {
                        url: source.url.clone(),
                        manifest: Some(resolved.resolved_url),
                        method: Some(resolved.method),
                        error: None,
                    });
                }
                Err(e) if e.is_cancelled() => {
                    cancelled = true;
                    break;
                }
                Err(e) => {
                    error!("Source {} failed: {}", source.url, e);
                    stats.sources_failed += 1;
                    stats.sources.push(SourceReport {
                        url: source.url.clone(),
                        manifest: None,
                        method: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        stats.record_leaves(&counters);

        if self.options.prune {
            if cancelled || stats.budget_exhausted || stats.sources_failed > 0 {
                warn!("Skipping ledger prune: not every source was walked to completion");
            } else {
                let removed = self.ledger.prune_unseen();
                for id in &removed {
                    debug!("Pruned {}", id);
                }
                stats.pruned = removed.len();
            }
        }

        // A cancelled run still persists what it recorded
        let save_token = if cancelled {
            CancelToken::new()
        } else {
            cancel.clone()
        };
        self.ledger.save(&save_token).await?;
        stats.ledger_entries = self.ledger.len();
        stats.duration = start_time.elapsed();

        if cancelled {
            warn!(
                "Harvest cancelled after {} processed, {} unchanged leaves",
                stats.leaves_processed, stats.leaves_unchanged
            );
            return Err(HarvestError::Cancelled);
        }

        info!(
            "Harvest completed: {} processed, {} unchanged, {} failed in {:?}",
            stats.leaves_processed,
            stats.leaves_unchanged,
            stats.leaves_failed,
            stats.duration
        );
        Ok(stats)
    }

    /// Resolves and walks one source
    async fn harvest_source(
        &self,
        cancel: &CancelToken,
        source: &SourceConfig,
        budget: &Budget,
        counters: &Arc<LeafCounters>,
    ) -> Result<(DiscoveryResult, WalkReport), HarvestError> {
        let resolved = match source.kind {
            Some(kind) => DiscoveryResult::configured(&source.url, kind)?,
            None => {
                let resolver = Resolver::new(
                    Arc::clone(&self.fetcher),
                    self.retrier.clone(),
                    Arc::clone(&self.robots),
                );
                resolver.discover(cancel, &source.url).await?
            }
        };

        let leaf_handler = Arc::new(LeafHandler {
            fetcher: Arc::clone(&self.fetcher),
            processor: Arc::clone(&self.processor),
            retrier: self.retrier.clone(),
            robots: Arc::clone(&self.robots),
            ledger: Arc::clone(&self.ledger),
            counters: Arc::clone(counters),
            allowed_domains: source.allowed_domains.clone(),
            robots_agent: robots_agent(&self.config.fetch.user_agent),
        });

        let walker = Walker::new(
            Arc::clone(&self.fetcher),
            self.retrier.clone(),
            self.config.harvest.concurrency,
        );
        let report = walker
            .walk(
                cancel,
                &resolved.resolved_url,
                resolved.kind,
                budget,
                move |token, leaf| {
                    let handler = Arc::clone(&leaf_handler);
                    async move { handler.handle(&token, leaf).await }
                },
            )
            .await?;

        Ok((resolved, report))
    }
}

/// Per-leaf pipeline shared by every task of a walk
struct LeafHandler {
    fetcher: Arc<dyn Fetcher>,
    processor: Arc<dyn Processor>,
    retrier: Retrier,
    robots: Arc<RobotsCache>,
    ledger: Arc<Ledger>,
    counters: Arc<LeafCounters>,
    allowed_domains: Vec<String>,
    robots_agent: String,
}

impl LeafHandler {
    async fn handle(&self, cancel: &CancelToken, leaf: Leaf) -> Result<(), HarvestError> {
        if !self.ledger.mark_seen(&leaf.id) {
            debug!("Already handled {} this run", leaf.id);
            LeafCounters::bump(&self.counters.duplicate);
            return Ok(());
        }

        let parsed = Url::parse(&leaf.id)
            .map_err(|e| crate::UrlError::Malformed(format!("{}: {}", leaf.id, e)))?;
        if !host_allowed(&self.allowed_domains, &parsed) {
            debug!("{} is outside the allowed domains", leaf.id);
            LeafCounters::bump(&self.counters.domain_filtered);
            return Ok(());
        }

        if !self
            .robots
            .is_allowed(self.fetcher.as_ref(), cancel, &leaf.url, &self.robots_agent)
            .await?
        {
            info!("URL {} disallowed by robots.txt", leaf.url);
            LeafCounters::bump(&self.counters.robots_denied);
            return Ok(());
        }

        let response = fetch_with_retry(self.fetcher.as_ref(), &self.retrier, cancel, &leaf.url)
            .await
            .inspect_err(|e| {
                if !e.is_cancelled() {
                    warn!("Failed to fetch {}: {}", leaf.url, e);
                }
            })?;

        let hash = content_hash(&response.body);
        if !self.ledger.should_process(&leaf.id, &hash) {
            debug!("{} unchanged", leaf.id);
            LeafCounters::bump(&self.counters.unchanged);
            return Ok(());
        }

        let doc = LeafDocument {
            id: leaf.id.clone(),
            url: leaf.url,
            content_type: response.content_type().map(str::to_string),
            body: response.body,
            content_hash: hash,
            last_modified: leaf.last_modified,
        };
        let output = self.processor.process(cancel, &doc).await.inspect_err(|e| {
            if !e.is_cancelled() {
                warn!("Processor failed for {}: {}", doc.url, e);
            }
        })?;

        self.ledger
            .update(&leaf.id, PageState::new(doc.content_hash, output.file_path));
        LeafCounters::bump(&self.counters.processed);
        Ok(())
    }
}

/// Product token matched against robots.txt `User-agent` lines
fn robots_agent(user_agent: &str) -> String {
    user_agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .next()
        .filter(|token| !token.is_empty())
        .unwrap_or(user_agent)
        .to_string()
}

/// Builds the default coordinator for `config` and runs it
///
/// # Arguments
///
/// * `config` - The harvest configuration
/// * `options` - Run-level switches
/// * `cancel` - Run-wide cancellation token
pub async fn run_harvest(
    config: Config,
    options: HarvestOptions,
    cancel: &CancelToken,
) -> Result<HarvestStats, HarvestError> {
    let coordinator = Coordinator::new(config, options)?;
    coordinator.run(cancel).await
}
