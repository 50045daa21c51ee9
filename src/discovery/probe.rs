//! Priority-race probing
//!
//! Every candidate entry point is fetched concurrently; the winner is the
//! highest-priority probe that succeeded, not the fastest one. Results land
//! in a fixed table indexed by probe position, which is scanned in priority
//! order once all probes have finished.

use crate::cancel::CancelToken;
use crate::crawler::{fetch_with_retry, run_all, Fetcher, Retrier};
use crate::discovery::{DiscoveryProbe, DiscoveryResult};
use crate::manifest::looks_like;
use crate::url::canonicalize;
use crate::{HarvestError, UrlError};
use std::sync::{Arc, Mutex};
use tracing::debug;
use url::Url;

/// Fetches every probe against `base` and returns the best success
///
/// A probe succeeds when its fetch returns status 200 and the body passes the
/// content-shape check for the probe's manifest kind. Among successes the
/// lowest priority value wins; ties go to the earlier probe in `probes`.
/// Returns `Ok(None)` when no probe succeeded.
pub async fn race_probes(
    fetcher: Arc<dyn Fetcher>,
    retrier: &Retrier,
    cancel: &CancelToken,
    base: &str,
    probes: &[DiscoveryProbe],
) -> Result<Option<DiscoveryResult>, HarvestError> {
    if probes.is_empty() {
        return Ok(None);
    }

    let targets: Vec<(usize, String)> = probes
        .iter()
        .enumerate()
        .map(|(i, probe)| -> Result<(usize, String), HarvestError> {
            Ok((i, probe_url(base, probe.path)?))
        })
        .collect::<Result<_, _>>()?;

    let results: Arc<Mutex<Vec<Option<DiscoveryResult>>>> =
        Arc::new(Mutex::new(vec![None; probes.len()]));

    let table = Arc::clone(&results);
    let owned_probes: Arc<Vec<DiscoveryProbe>> = Arc::new(probes.to_vec());
    let retrier = retrier.clone();

    let outcome = run_all(cancel, targets, probes.len(), move |cancel, (index, url)| {
        let fetcher = Arc::clone(&fetcher);
        let retrier = retrier.clone();
        let table = Arc::clone(&table);
        let probe = owned_probes[index].clone();
        async move {
            let response = fetch_with_retry(fetcher.as_ref(), &retrier, &cancel, &url).await?;
            if response.status != 200 || !looks_like(probe.kind, &response.text()) {
                debug!("Probe {} at {} returned no usable manifest", probe.name, url);
                return Ok(());
            }

            let resolved_url = canonicalize(&url)?;
            debug!("Probe {} succeeded at {}", probe.name, resolved_url);
            let mut slots = table.lock().unwrap_or_else(|e| e.into_inner());
            slots[index] = Some(DiscoveryResult {
                resolved_url,
                method: probe.name.to_string(),
                kind: probe.kind,
            });
            Ok::<(), HarvestError>(())
        }
    })
    .await;

    if outcome.cancelled {
        return Err(HarvestError::Cancelled);
    }
    for (index, err) in outcome.errors() {
        debug!("Probe {} failed: {}", probes[index].name, err);
    }

    let mut slots = results.lock().unwrap_or_else(|e| e.into_inner());
    let mut order: Vec<usize> = (0..probes.len()).collect();
    order.sort_by_key(|&i| probes[i].priority);

    Ok(order.into_iter().find_map(|i| slots[i].take()))
}

/// Appends a probe path to the base locator's path
///
/// `https://host/docs` with `/llms.txt` probes `https://host/docs/llms.txt`.
/// The base's query string is dropped.
pub(crate) fn probe_url(base: &str, probe_path: &str) -> Result<String, UrlError> {
    let canonical = canonicalize(base)?;
    let mut url =
        Url::parse(&canonical).map_err(|e| UrlError::Malformed(format!("{}: {}", base, e)))?;
    url.set_query(None);
    url.set_fragment(None);

    let path = format!(
        "{}/{}",
        url.path().trim_end_matches('/'),
        probe_path.trim_start_matches('/')
    );
    url.set_path(&path);
    Ok(url.to_string())
}
