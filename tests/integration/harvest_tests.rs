use crate::common::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sumi_harvest::crawler::HarvestOptions;
use sumi_harvest::{CancelToken, Ledger};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_global_limit_across_batches() {
    let server = MockServer::start().await;
    let base = server.uri();
    let first = page_urls(&base, "a", 8);
    let second = page_urls(&base, "b", 5);

    mount_body(
        &server,
        "/sitemap.xml",
        sitemap_index(&[format!("{}/index-1.xml", base), format!("{}/index-2.xml", base)]),
    )
    .await;
    mount_body(&server, "/index-1.xml", urlset(&first)).await;
    mount_body(&server, "/index-2.xml", urlset(&second)).await;
    mount_pages(&server, &first).await;
    mount_pages(&server, &second).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(
        dir.path(),
        vec![sitemap_source(format!("{}/sitemap.xml", base))],
        Some(10),
    );
    let processor = Arc::new(RecordingProcessor::default());
    let stats = coordinator(config, HarvestOptions::default(), Arc::clone(&processor))
        .run(&CancelToken::new())
        .await
        .unwrap();

    assert_eq!(stats.leaves_processed, 10);
    assert!(stats.budget_exhausted);

    let seen = processor.seen();
    assert_eq!(seen.len(), 10);
    for url in &first {
        assert!(seen.contains(url), "{} should be processed", url);
    }
    assert!(seen.contains(&second[0]));
    assert!(seen.contains(&second[1]));

    let requested = request_paths(&server).await;
    for skipped in ["/b/3", "/b/4", "/b/5"] {
        assert!(!requested.iter().any(|p| p == skipped), "{} was fetched", skipped);
    }
}

#[tokio::test]
async fn test_failing_index_is_isolated() {
    let server = MockServer::start().await;
    let base = server.uri();
    let first = page_urls(&base, "one", 3);
    let third = page_urls(&base, "three", 3);

    mount_body(
        &server,
        "/sitemap.xml",
        sitemap_index(&[
            format!("{}/index-1.xml", base),
            format!("{}/index-2.xml", base),
            format!("{}/index-3.xml", base),
        ]),
    )
    .await;
    mount_body(&server, "/index-1.xml", urlset(&first)).await;
    Mock::given(method("GET"))
        .and(path("/index-2.xml"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_body(&server, "/index-3.xml", urlset(&third)).await;
    mount_pages(&server, &first).await;
    mount_pages(&server, &third).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(
        dir.path(),
        vec![sitemap_source(format!("{}/sitemap.xml", base))],
        None,
    );
    let processor = Arc::new(RecordingProcessor::default());
    let stats = coordinator(config, HarvestOptions::default(), Arc::clone(&processor))
        .run(&CancelToken::new())
        .await
        .unwrap();

    assert_eq!(stats.indexes_failed, 1);
    assert_eq!(stats.indexes_fetched, 3);
    assert_eq!(stats.leaves_processed, 6);
    assert_eq!(stats.sources_failed, 0);
    assert!(stats.has_failures());

    let seen = processor.seen();
    for url in first.iter().chain(third.iter()) {
        assert!(seen.contains(url));
    }
}

#[tokio::test]
async fn test_batch_finishes_before_next_index() {
    let server = MockServer::start().await;
    let base = server.uri();
    let first = page_urls(&base, "one", 3);
    let second = page_urls(&base, "two", 3);

    mount_body(
        &server,
        "/sitemap.xml",
        sitemap_index(&[format!("{}/index-1.xml", base), format!("{}/index-2.xml", base)]),
    )
    .await;
    mount_body(&server, "/index-1.xml", urlset(&first)).await;
    mount_body(&server, "/index-2.xml", urlset(&second)).await;
    mount_pages(&server, &first).await;
    mount_pages(&server, &second).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(
        dir.path(),
        vec![sitemap_source(format!("{}/sitemap.xml", base))],
        None,
    );
    let processor = Arc::new(RecordingProcessor::default());
    coordinator(config, HarvestOptions::default(), processor)
        .run(&CancelToken::new())
        .await
        .unwrap();

    let requested = request_paths(&server).await;
    let position = |p: &str| requested.iter().position(|r| r == p).unwrap();
    let index_2 = position("/index-2.xml");

    for leaf in ["/one/1", "/one/2", "/one/3"] {
        assert!(position(leaf) < index_2, "{} fetched after index 2", leaf);
    }
    for leaf in ["/two/1", "/two/2", "/two/3"] {
        assert!(position(leaf) > index_2, "{} fetched before index 2", leaf);
    }
}

#[tokio::test]
async fn test_ledger_skips_unchanged_pages() {
    let server = MockServer::start().await;
    let base = server.uri();
    let pages = page_urls(&base, "docs", 3);
    mount_body(&server, "/sitemap.xml", urlset(&pages)).await;
    mount_pages(&server, &pages).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(
        dir.path(),
        vec![sitemap_source(format!("{}/sitemap.xml", base))],
        None,
    );

    let first_run = Arc::new(RecordingProcessor::default());
    let stats = coordinator(config.clone(), HarvestOptions::default(), Arc::clone(&first_run))
        .run(&CancelToken::new())
        .await
        .unwrap();
    assert_eq!(stats.leaves_processed, 3);
    assert_eq!(stats.ledger_entries, 3);

    let second_run = Arc::new(RecordingProcessor::default());
    let stats = coordinator(config.clone(), HarvestOptions::default(), Arc::clone(&second_run))
        .run(&CancelToken::new())
        .await
        .unwrap();
    assert_eq!(stats.leaves_processed, 0);
    assert_eq!(stats.leaves_unchanged, 3);
    assert!(second_run.seen().is_empty());

    // A stored fingerprint that no longer matches forces reprocessing
    let ledger_path = dir.path().join("ledger.json");
    let mut snapshot: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&ledger_path).unwrap()).unwrap();
    snapshot["entries"][&pages[1]]["contentHash"] = serde_json::json!("outdated");
    std::fs::write(&ledger_path, serde_json::to_string(&snapshot).unwrap()).unwrap();

    let third_run = Arc::new(RecordingProcessor::default());
    let stats = coordinator(config, HarvestOptions::default(), Arc::clone(&third_run))
        .run(&CancelToken::new())
        .await
        .unwrap();
    assert_eq!(stats.leaves_processed, 1);
    assert_eq!(stats.leaves_unchanged, 2);
    assert_eq!(third_run.seen(), vec![pages[1].clone()]);
}

#[tokio::test]
async fn test_fresh_run_ignores_ledger() {
    let server = MockServer::start().await;
    let base = server.uri();
    let pages = page_urls(&base, "docs", 2);
    mount_body(&server, "/sitemap.xml", urlset(&pages)).await;
    mount_pages(&server, &pages).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(
        dir.path(),
        vec![sitemap_source(format!("{}/sitemap.xml", base))],
        None,
    );

    for _ in 0..2 {
        let stats = coordinator(
            config.clone(),
            HarvestOptions {
                fresh: true,
                prune: false,
            },
            Arc::new(RecordingProcessor::default()),
        )
        .run(&CancelToken::new())
        .await
        .unwrap();
        assert_eq!(stats.leaves_processed, 2);
    }
}

#[tokio::test]
async fn test_prune_removes_unlisted_pages() {
    let server = MockServer::start().await;
    let base = server.uri();
    let pages = page_urls(&base, "docs", 2);
    mount_body(&server, "/sitemap.xml", urlset(&pages)).await;
    mount_pages(&server, &pages).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(
        dir.path(),
        vec![sitemap_source(format!("{}/sitemap.xml", base))],
        None,
    );

    let stale = Ledger::new(&config.harvest.ledger_path);
    stale.update(
        &format!("{}/removed-page", base),
        sumi_harvest::PageState::new("old", "memory/old"),
    );
    stale.save(&CancelToken::new()).await.unwrap();

    let options = HarvestOptions {
        fresh: false,
        prune: true,
    };
    let stats = coordinator(config.clone(), options, Arc::new(RecordingProcessor::default()))
        .run(&CancelToken::new())
        .await
        .unwrap();
    assert_eq!(stats.pruned, 1);
    assert_eq!(stats.ledger_entries, 2);

    let reloaded = Ledger::open(&config.harvest.ledger_path, &CancelToken::new())
        .await
        .unwrap();
    assert!(reloaded.get(&format!("{}/removed-page", base)).is_none());
    assert!(reloaded.get(&pages[0]).is_some());
}

#[tokio::test]
async fn test_robots_disallowed_leaves_are_not_fetched() {
    let server = MockServer::start().await;
    let base = server.uri();
    let public = format!("{}/public/page", base);
    let private = format!("{}/private/page", base);

    mount_body(
        &server,
        "/robots.txt",
        "User-agent: *\nDisallow: /private\n".to_string(),
    )
    .await;
    mount_body(&server, "/sitemap.xml", urlset(&[public.clone(), private])).await;
    mount_pages(&server, &[public.clone()]).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(
        dir.path(),
        vec![sitemap_source(format!("{}/sitemap.xml", base))],
        None,
    );
    let processor = Arc::new(RecordingProcessor::default());
    let stats = coordinator(config, HarvestOptions::default(), Arc::clone(&processor))
        .run(&CancelToken::new())
        .await
        .unwrap();

    assert_eq!(stats.leaves_processed, 1);
    assert_eq!(stats.robots_denied, 1);
    assert_eq!(processor.seen(), vec![public]);
    assert!(!request_paths(&server)
        .await
        .iter()
        .any(|p| p == "/private/page"));
}

#[tokio::test]
async fn test_allowed_domains_filter_leaves() {
    let server = MockServer::start().await;
    let base = server.uri();
    let local = format!("{}/docs/page", base);

    mount_body(
        &server,
        "/sitemap.xml",
        urlset(&[local.clone(), "https://elsewhere.example.org/page".to_string()]),
    )
    .await;
    mount_pages(&server, &[local.clone()]).await;

    let dir = TempDir::new().unwrap();
    let mut source = sitemap_source(format!("{}/sitemap.xml", base));
    source.allowed_domains = vec!["127.0.0.1".to_string()];
    let config = test_config(dir.path(), vec![source], None);

    let processor = Arc::new(RecordingProcessor::default());
    let stats = coordinator(config, HarvestOptions::default(), Arc::clone(&processor))
        .run(&CancelToken::new())
        .await
        .unwrap();

    assert_eq!(stats.leaves_processed, 1);
    assert_eq!(stats.domain_filtered, 1);
    assert_eq!(processor.seen(), vec![local]);
}

#[tokio::test]
async fn test_transient_leaf_failure_is_retried() {
    let server = MockServer::start().await;
    let base = server.uri();
    let flaky = format!("{}/flaky", base);

    mount_body(&server, "/sitemap.xml", urlset(&[flaky.clone()])).await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_body(&server, "/flaky", "recovered".to_string()).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(
        dir.path(),
        vec![sitemap_source(format!("{}/sitemap.xml", base))],
        None,
    );
    let stats = coordinator(
        config,
        HarvestOptions::default(),
        Arc::new(RecordingProcessor::default()),
    )
    .run(&CancelToken::new())
    .await
    .unwrap();

    assert_eq!(stats.leaves_processed, 1);
    assert_eq!(stats.leaves_failed, 0);
}

#[tokio::test]
async fn test_permanent_leaf_failure_is_counted() {
    let server = MockServer::start().await;
    let base = server.uri();
    let good = format!("{}/good", base);
    let missing = format!("{}/missing", base);

    mount_body(&server, "/sitemap.xml", urlset(&[good.clone(), missing])).await;
    mount_pages(&server, &[good]).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(
        dir.path(),
        vec![sitemap_source(format!("{}/sitemap.xml", base))],
        None,
    );
    let stats = coordinator(
        config,
        HarvestOptions::default(),
        Arc::new(RecordingProcessor::default()),
    )
    .run(&CancelToken::new())
    .await
    .unwrap();

    assert_eq!(stats.leaves_processed, 1);
    assert_eq!(stats.leaves_failed, 1);
    assert_eq!(stats.ledger_entries, 1);
}

#[tokio::test]
async fn test_discovered_source_end_to_end() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_body(
        &server,
        "/llms.txt",
        "# Example\n\n> Docs\n\n- [Guide](/docs/guide.md)\n- [API](/docs/api.md)\n".to_string(),
    )
    .await;
    mount_body(&server, "/docs/guide.md", "# Guide".to_string()).await;
    mount_body(&server, "/docs/api.md", "# API".to_string()).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), vec![discovered_source(base.clone())], None);
    let processor = Arc::new(RecordingProcessor::default());
    let stats = coordinator(config, HarvestOptions::default(), Arc::clone(&processor))
        .run(&CancelToken::new())
        .await
        .unwrap();

    assert_eq!(stats.sources_resolved, 1);
    assert_eq!(stats.sources[0].method.as_deref(), Some("llms"));
    assert_eq!(stats.leaves_processed, 2);
    assert_eq!(
        processor.seen(),
        vec![format!("{}/docs/api.md", base), format!("{}/docs/guide.md", base)]
    );
}

#[tokio::test]
async fn test_unresolvable_source_does_not_abort_run() {
    let empty = MockServer::start().await;
    let server = MockServer::start().await;
    let base = server.uri();
    let pages = page_urls(&base, "docs", 2);
    mount_body(&server, "/sitemap.xml", urlset(&pages)).await;
    mount_pages(&server, &pages).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(
        dir.path(),
        vec![
            discovered_source(empty.uri()),
            sitemap_source(format!("{}/sitemap.xml", base)),
        ],
        None,
    );
    let stats = coordinator(
        config,
        HarvestOptions::default(),
        Arc::new(RecordingProcessor::default()),
    )
    .run(&CancelToken::new())
    .await
    .unwrap();

    assert_eq!(stats.sources_failed, 1);
    assert_eq!(stats.sources_resolved, 1);
    assert_eq!(stats.leaves_processed, 2);
    assert!(stats.sources[0].error.is_some());
}

#[tokio::test]
async fn test_leaf_listed_by_two_sources_is_processed_once() {
    let server = MockServer::start().await;
    let base = server.uri();
    let shared = format!("{}/shared", base);
    mount_body(&server, "/first.xml", urlset(&[shared.clone()])).await;
    mount_body(&server, "/second.xml", urlset(&[shared.clone()])).await;
    mount_pages(&server, &[shared]).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(
        dir.path(),
        vec![
            sitemap_source(format!("{}/first.xml", base)),
            sitemap_source(format!("{}/second.xml", base)),
        ],
        None,
    );
    let stats = coordinator(
        config,
        HarvestOptions::default(),
        Arc::new(RecordingProcessor::default()),
    )
    .run(&CancelToken::new())
    .await
    .unwrap();

    assert_eq!(stats.leaves_processed, 1);
    assert_eq!(stats.leaves_duplicate, 1);
}

#[tokio::test]
async fn test_pre_cancelled_harvest_returns_promptly() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(
        dir.path(),
        vec![sitemap_source(format!("{}/sitemap.xml", server.uri()))],
        None,
    );
    let processor = Arc::new(RecordingProcessor::with_delay(Duration::from_millis(50)));

    let cancel = CancelToken::new();
    cancel.cancel();
    let options = HarvestOptions {
        fresh: true,
        prune: false,
    };

    let start = Instant::now();
    let err = coordinator(config, options, Arc::clone(&processor))
        .run(&cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(start.elapsed() < Duration::from_millis(100));
    assert!(processor.seen().is_empty());
    assert!(request_paths(&server).await.is_empty());
}
