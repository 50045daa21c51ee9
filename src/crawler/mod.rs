//! Crawler module for fetching and running harvest work
//!
//! This module contains the execution machinery, including:
//! - The fetch collaborator seam and its HTTP implementation
//! - Retry with classified errors and exponential backoff
//! - Bounded concurrent execution (batch runner and streaming pool)
//! - Overall harvest coordination

mod coordinator;
mod fetcher;
mod pool;
mod retry;
mod runner;

pub use coordinator::{run_harvest, Coordinator, HarvestOptions};
pub use fetcher::{
    build_http_client, is_retryable_status, parse_retry_after, FetchError, FetchResponse,
    Fetcher, HttpFetcher,
};
pub use pool::{PoolResult, TaskPool};
pub use retry::{Retrier, RetryConfig, RetryError, Retryable};
pub use runner::{run_all, RunOutcome, TaskSlot};

use crate::cancel::CancelToken;
use crate::HarvestError;

/// Fetches `url` through the retry executor, treating any non-2xx status as
/// an error
///
/// Retry exhaustion maps to [`HarvestError::Transient`], non-retryable
/// failures to [`HarvestError::Permanent`] and cancellation to
/// [`HarvestError::Cancelled`].
pub async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    retrier: &Retrier,
    cancel: &CancelToken,
    url: &str,
) -> Result<FetchResponse, HarvestError> {
    retrier
        .retry(cancel, || async move {
            fetcher.fetch(cancel, url, &[]).await?.error_for_status()
        })
        .await
        .map_err(|e| HarvestError::from_retry(url, e))
}
