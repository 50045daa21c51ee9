//! Nested-manifest batch walk
//!
//! A manifest is a tree: indexes point at further manifests, leaves at
//! pages. The walk never materializes the tree. It fetches one index, hands
//! that index's leaves to the runner as one batch, waits for the batch, and
//! only then fetches the next index (breadth-first, document order).

use crate::cancel::CancelToken;
use crate::crawler::{fetch_with_retry, run_all, Fetcher, Retrier};
use crate::discovery::Budget;
use crate::manifest::{looks_like, parse_manifest, ManifestEntry, ManifestKind};
use crate::url::canonicalize;
use crate::HarvestError;
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A leaf handed to the per-leaf callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    /// Canonical identity, the ledger key
    pub id: String,
    /// Absolute URL as listed in the manifest
    pub url: String,
    /// `<lastmod>` or equivalent, when the manifest provides one
    pub last_modified: Option<String>,
}

/// Counters for one walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkReport {
    /// Manifests fetched and parsed, including the root
    pub indexes_fetched: usize,
    /// Nested manifests that could not be fetched or parsed
    pub indexes_failed: usize,
    /// Leaves handed to the callback
    pub leaves_dispatched: usize,
    /// Leaves whose callback failed or panicked
    pub leaves_failed: usize,
    /// Leaves skipped because their identity was already dispatched
    pub leaves_duplicate: usize,
    /// True if the budget truncated the walk
    pub budget_exhausted: bool,
}

/// Walks manifests and dispatches their leaves in batches
#[derive(Clone)]
pub struct Walker {
    fetcher: Arc<dyn Fetcher>,
    retrier: Retrier,
    concurrency: usize,
}

impl Walker {
    pub fn new(fetcher: Arc<dyn Fetcher>, retrier: Retrier, concurrency: usize) -> Self {
        Self {
            fetcher,
            retrier,
            concurrency,
        }
    }

    /// Walks the manifest at `root_url`, calling `on_leaf` for every new leaf
    ///
    /// Failure of the root manifest is returned as an error. Failure of a
    /// nested index is logged and counted in
    /// [`WalkReport::indexes_failed`]; the walk continues with the next
    /// index. Cancellation is checked before every index fetch and ends the
    /// walk with [`HarvestError::Cancelled`].
    pub async fn walk<F, Fut>(
        &self,
        cancel: &CancelToken,
        root_url: &str,
        kind: ManifestKind,
        budget: &Budget,
        on_leaf: F,
    ) -> Result<WalkReport, HarvestError>
    where
        F: Fn(CancelToken, Leaf) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HarvestError>> + Send + 'static,
    {
        let on_leaf = Arc::new(on_leaf);
        let mut report = WalkReport::default();
        let mut seen_indexes: HashSet<String> = HashSet::new();
        let mut seen_leaves: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();

        cancel.check()?;
        let root_id = canonicalize(root_url)?;
        seen_indexes.insert(root_id);

        let entries = self.fetch_manifest(cancel, root_url, kind).await?;
        report.indexes_fetched += 1;
        let batch = self.collect(
            entries,
            &mut seen_indexes,
            &mut seen_leaves,
            &mut queue,
            &mut report,
        );
        self.dispatch(cancel, batch, budget, &on_leaf, &mut report).await?;

        while let Some(index_url) = queue.pop_front() {
            if budget.is_exhausted() {
                debug!("Budget exhausted, {} indexes left unfetched", queue.len() + 1);
                report.budget_exhausted = true;
                break;
            }
            cancel.check()?;

            let entries = match self.fetch_manifest(cancel, &index_url, kind).await {
                Ok(entries) => entries,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    let skipped = HarvestError::IndexUnavailable {
                        url: index_url.clone(),
                        reason: e.to_string(),
                    };
                    warn!("Skipping index: {}", skipped);
                    report.indexes_failed += 1;
                    continue;
                }
            };
            report.indexes_fetched += 1;

            let batch = self.collect(
                entries,
                &mut seen_indexes,
                &mut seen_leaves,
                &mut queue,
                &mut report,
            );
            self.dispatch(cancel, batch, budget, &on_leaf, &mut report).await?;
        }

        info!(
            "Walk of {} finished: {} indexes, {} leaves dispatched, {} failed",
            root_url, report.indexes_fetched, report.leaves_dispatched, report.leaves_failed
        );
        Ok(report)
    }

    async fn fetch_manifest(
        &self,
        cancel: &CancelToken,
        url: &str,
        kind: ManifestKind,
    ) -> Result<Vec<ManifestEntry>, HarvestError> {
        let response = fetch_with_retry(self.fetcher.as_ref(), &self.retrier, cancel, url).await?;
        let body = response.text();
        if !looks_like(kind, &body) {
            return Err(HarvestError::ManifestParse {
                url: url.to_string(),
                message: format!("body is not a {} manifest", kind),
            });
        }
        parse_manifest(kind, url, &body)
    }

    /// Splits entries into the next leaf batch, queueing new indexes
    fn collect(
        &self,
        entries: Vec<ManifestEntry>,
        seen_indexes: &mut HashSet<String>,
        seen_leaves: &mut HashSet<String>,
        queue: &mut VecDeque<String>,
        report: &mut WalkReport,
    ) -> Vec<Leaf> {
        let mut batch = Vec::new();

        for entry in entries {
            let id = match canonicalize(entry.url()) {
                Ok(id) => id,
                Err(e) => {
                    debug!("Skipping malformed entry {}: {}", entry.url(), e);
                    continue;
                }
            };

            match entry {
                ManifestEntry::Index { url } => {
                    if seen_indexes.insert(id) {
                        queue.push_back(url);
                    }
                }
                ManifestEntry::Leaf { url, last_modified } => {
                    if seen_leaves.insert(id.clone()) {
                        batch.push(Leaf {
                            id,
                            url,
                            last_modified,
                        });
                    } else {
                        report.leaves_duplicate += 1;
                    }
                }
            }
        }

        batch
    }

    /// Runs one batch to completion, truncated to the remaining budget
    async fn dispatch<F, Fut>(
        &self,
        cancel: &CancelToken,
        mut batch: Vec<Leaf>,
        budget: &Budget,
        on_leaf: &Arc<F>,
        report: &mut WalkReport,
    ) -> Result<(), HarvestError>
    where
        F: Fn(CancelToken, Leaf) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HarvestError>> + Send + 'static,
    {
        if batch.is_empty() {
            return Ok(());
        }

        let granted = budget.take(batch.len());
        if granted < batch.len() {
            debug!("Budget truncates batch from {} to {} leaves", batch.len(), granted);
            batch.truncate(granted);
            report.budget_exhausted = true;
        }
        if batch.is_empty() {
            return Ok(());
        }

        let dispatched = batch.len();
        let callback = Arc::clone(on_leaf);
        let outcome = run_all(cancel, batch, self.concurrency, move |token, leaf| {
            callback(token, leaf)
        })
        .await;

        report.leaves_dispatched += dispatched;
        report.leaves_failed += outcome.failed();
        for (_, err) in outcome.errors() {
            debug!("Leaf failed: {}", err);
        }

        if outcome.cancelled {
            return Err(HarvestError::Cancelled);
        }
        Ok(())
    }
}
