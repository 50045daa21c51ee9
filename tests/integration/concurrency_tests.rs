use crate::common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sumi_harvest::crawler::{
    fetch_with_retry, run_all, HarvestOptions, Retrier, RetryConfig, TaskPool,
};
use sumi_harvest::{CancelToken, HarvestError};
use tempfile::TempDir;
use wiremock::MockServer;

#[tokio::test]
async fn test_harvest_respects_concurrency_limit() {
    let server = MockServer::start().await;
    let base = server.uri();
    let pages = page_urls(&base, "docs", 10);
    mount_body(&server, "/sitemap.xml", urlset(&pages)).await;
    mount_pages(&server, &pages).await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(
        dir.path(),
        vec![sitemap_source(format!("{}/sitemap.xml", base))],
        None,
    );
    config.harvest.concurrency = 2;

    let processor = Arc::new(RecordingProcessor::with_delay(Duration::from_millis(20)));
    let stats = coordinator(config, HarvestOptions::default(), Arc::clone(&processor))
        .run(&CancelToken::new())
        .await
        .unwrap();

    assert_eq!(stats.leaves_processed, 10);
    let peak = processor.peak.load(Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 2, "peak in-flight was {}", peak);
}

#[tokio::test]
async fn test_run_all_peak_in_flight() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let (current, max) = (Arc::clone(&in_flight), Arc::clone(&peak));
    let outcome = run_all(&CancelToken::new(), (0..10).collect(), 2, move |_, _n: u32| {
        let current = Arc::clone(&current);
        let max = Arc::clone(&max);
        async move {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            max.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            current.fetch_sub(1, Ordering::SeqCst);
            Ok::<(), HarvestError>(())
        }
    })
    .await;

    assert_eq!(outcome.succeeded(), 10);
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_pre_cancelled_run_all_runs_nothing() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let ran = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&ran);
    let start = Instant::now();
    let outcome = run_all(&cancel, (0..100).collect(), 8, move |_, _n: u32| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<(), HarvestError>(())
        }
    })
    .await;

    assert!(start.elapsed() < Duration::from_millis(100));
    assert!(outcome.cancelled);
    assert_eq!(outcome.pending(), 100);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert!(matches!(outcome.into_result(), Err(HarvestError::Cancelled)));
}

#[tokio::test]
async fn test_task_pool_streams_fetches() {
    let server = MockServer::start().await;
    let base = server.uri();
    let pages = page_urls(&base, "stream", 5);
    mount_pages(&server, &pages).await;

    let fetcher = http_fetcher();
    let retrier = Retrier::new(RetryConfig {
        max_attempts: 1,
        ..RetryConfig::default()
    });
    let mut pool = TaskPool::spawn(CancelToken::new(), 2, move |cancel, url: String| {
        let fetcher = Arc::clone(&fetcher);
        let retrier = retrier.clone();
        async move {
            fetch_with_retry(fetcher.as_ref(), &retrier, &cancel, &url).await?;
            Ok::<(), HarvestError>(())
        }
    });

    for url in &pages {
        pool.submit(url.clone()).await.unwrap();
    }
    pool.submit(format!("{}/not-mounted", base)).await.unwrap();
    pool.close();

    let mut succeeded = 0;
    let mut failed = Vec::new();
    while let Some(result) = pool.next().await {
        if result.slot.is_success() {
            succeeded += 1;
        } else {
            failed.push(result.seq);
        }
    }

    assert_eq!(succeeded, 5);
    assert_eq!(failed, vec![5]);
}
