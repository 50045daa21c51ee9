//! Run statistics
//!
//! [`HarvestStats`] is produced at the end of a run; [`LedgerStatistics`]
//! summarizes a ledger snapshot for the `--stats` mode.

use crate::discovery::WalkReport;
use crate::state::Ledger;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

/// Outcome of one configured source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    /// Source locator as configured
    pub url: String,
    /// Manifest the source resolved to
    pub manifest: Option<String>,
    /// How the manifest was found
    pub method: Option<String>,
    /// Why the source produced nothing, if it failed
    pub error: Option<String>,
}

/// Statistics for a complete harvest run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestStats {
    pub sources_resolved: usize,
    pub sources_failed: usize,
    pub indexes_fetched: usize,
    pub indexes_failed: usize,
    /// Leaves fetched and handed to the processor
    pub leaves_processed: usize,
    /// Leaves whose content hash matched the ledger
    pub leaves_unchanged: usize,
    pub leaves_failed: usize,
    pub robots_denied: usize,
    /// Leaves outside the source's allowed domains
    pub domain_filtered: usize,
    /// Leaves already handled earlier in the run
    pub leaves_duplicate: usize,
    pub budget_exhausted: bool,
    /// Ledger records removed by pruning
    pub pruned: usize,
    pub ledger_entries: usize,
    pub duration: Duration,
    pub sources: Vec<SourceReport>,
}

impl HarvestStats {
    /// Folds one walk's counters into the run totals
    pub fn record_walk(&mut self, report: &WalkReport) {
        self.indexes_fetched += report.indexes_fetched;
        self.indexes_failed += report.indexes_failed;
        self.leaves_failed += report.leaves_failed;
        self.leaves_duplicate += report.leaves_duplicate;
        self.budget_exhausted |= report.budget_exhausted;
    }

    /// Folds the per-leaf counters into the run totals
    pub fn record_leaves(&mut self, counters: &LeafCounters) {
        self.leaves_processed += counters.processed.load(Ordering::Relaxed);
        self.leaves_unchanged += counters.unchanged.load(Ordering::Relaxed);
        self.robots_denied += counters.robots_denied.load(Ordering::Relaxed);
        self.domain_filtered += counters.domain_filtered.load(Ordering::Relaxed);
        self.leaves_duplicate += counters.duplicate.load(Ordering::Relaxed);
    }

    /// Leaves the run looked at, whatever happened to them
    pub fn leaves_total(&self) -> usize {
        self.leaves_processed
            + self.leaves_unchanged
            + self.leaves_failed
            + self.robots_denied
            + self.domain_filtered
            + self.leaves_duplicate
    }

    /// True if anything in the run failed
    pub fn has_failures(&self) -> bool {
        self.sources_failed > 0 || self.indexes_failed > 0 || self.leaves_failed > 0
    }
}

/// Counters updated concurrently by leaf tasks
#[derive(Debug, Default)]
pub struct LeafCounters {
    pub processed: AtomicUsize,
    pub unchanged: AtomicUsize,
    pub robots_denied: AtomicUsize,
    pub domain_filtered: AtomicUsize,
    pub duplicate: AtomicUsize,
}

impl LeafCounters {
    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Prints run statistics to stdout
pub fn print_statistics(stats: &HarvestStats) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Sources resolved: {}", stats.sources_resolved);
    println!("  Sources failed: {}", stats.sources_failed);
    println!("  Manifests fetched: {}", stats.indexes_fetched);
    println!("  Manifests skipped: {}", stats.indexes_failed);
    println!("  Duration: {:.1}s", stats.duration.as_secs_f64());
    println!();

    println!("Leaves:");
    println!("  Processed: {}", stats.leaves_processed);
    println!("  Unchanged: {}", stats.leaves_unchanged);
    println!("  Failed: {}", stats.leaves_failed);
    println!("  Denied by robots.txt: {}", stats.robots_denied);
    println!("  Outside allowed domains: {}", stats.domain_filtered);
    println!("  Duplicates: {}", stats.leaves_duplicate);
    println!();

    if !stats.sources.is_empty() {
        println!("Sources ({}):", stats.sources.len());
        for source in &stats.sources {
            match (&source.error, &source.manifest) {
                (Some(error), _) => println!("  - {} FAILED: {}", source.url, error),
                (None, Some(manifest)) => println!(
                    "  - {} -> {} ({})",
                    source.url,
                    manifest,
                    source.method.as_deref().unwrap_or("unknown")
                ),
                (None, None) => println!("  - {}", source.url),
            }
        }
        println!();
    }

    println!("Ledger: {} entries", stats.ledger_entries);
    if stats.pruned > 0 {
        println!("  Pruned: {}", stats.pruned);
    }
    if stats.budget_exhausted {
        println!("Item limit reached; remaining manifests were not walked");
    }

    let attempted = stats.leaves_processed + stats.leaves_unchanged + stats.leaves_failed;
    let success_rate = if attempted > 0 {
        ((stats.leaves_processed + stats.leaves_unchanged) as f64 / attempted as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "\nSuccess Rate: {:.1}% ({} / {} leaves fetched without error)",
        success_rate,
        stats.leaves_processed + stats.leaves_unchanged,
        attempted
    );
}

/// Summary of a ledger snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStatistics {
    pub total_entries: usize,
    pub entries_by_host: BTreeMap<String, usize>,
    pub oldest_fetch: Option<String>,
    pub newest_fetch: Option<String>,
}

/// Summarizes the records currently held by `ledger`
pub fn load_statistics(ledger: &Ledger) -> LedgerStatistics {
    let mut stats = LedgerStatistics::default();
    let mut oldest: Option<DateTime<Utc>> = None;
    let mut newest: Option<DateTime<Utc>> = None;

    for (id, state) in ledger.snapshot() {
        stats.total_entries += 1;
        let host = Url::parse(&id)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        *stats.entries_by_host.entry(host).or_insert(0) += 1;

        if oldest.map_or(true, |t| state.fetched_at < t) {
            oldest = Some(state.fetched_at);
        }
        if newest.map_or(true, |t| state.fetched_at > t) {
            newest = Some(state.fetched_at);
        }
    }

    stats.oldest_fetch = oldest.map(|t| t.to_rfc3339());
    stats.newest_fetch = newest.map(|t| t.to_rfc3339());
    stats
}

/// Prints ledger statistics to stdout
pub fn print_ledger_statistics(stats: &LedgerStatistics) {
    println!("=== Ledger Statistics ===\n");

    println!("Overview:");
    println!("  Total entries: {}", stats.total_entries);
    println!("  Hosts: {}", stats.entries_by_host.len());
    if let (Some(oldest), Some(newest)) = (&stats.oldest_fetch, &stats.newest_fetch) {
        println!("  Oldest fetch: {}", oldest);
        println!("  Newest fetch: {}", newest);
    }
    println!();

    if !stats.entries_by_host.is_empty() {
        println!("Entries by Host:");
        let mut hosts: Vec<_> = stats.entries_by_host.iter().collect();
        hosts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (host, count) in hosts {
            let percentage = (*count as f64 / stats.total_entries as f64) * 100.0;
            println!("  {}: {} ({:.1}%)", host, count, percentage);
        }
    }
}
