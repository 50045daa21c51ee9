use crate::common::*;
use std::sync::Arc;
use std::time::Duration;
use sumi_harvest::crawler::{Retrier, RetryConfig};
use sumi_harvest::discovery::{Resolver, ROBOTS_METHOD};
use sumi_harvest::manifest::ManifestKind;
use sumi_harvest::robots::RobotsCache;
use sumi_harvest::{CancelToken, HarvestError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn resolver() -> Resolver {
    let retrier = Retrier::new(RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        ..RetryConfig::default()
    });
    Resolver::new(http_fetcher(), retrier, Arc::new(RobotsCache::new()))
}

#[tokio::test]
async fn test_priority_beats_speed() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/llms.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("# Docs\n\n- [Intro](/intro.md)\n")
                .set_delay(Duration::from_millis(50)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(urlset(&[format!("{}/a", base)]))
                .set_delay(Duration::from_millis(10)),
        )
        .mount(&server)
        .await;

    let result = resolver().discover(&CancelToken::new(), &base).await.unwrap();
    assert_eq!(result.method, "llms");
    assert_eq!(result.kind, ManifestKind::Llms);
    assert_eq!(result.resolved_url, format!("{}/llms.txt", base));
}

#[tokio::test]
async fn test_failed_high_priority_probe_falls_through() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/llms.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_body(&server, "/sitemap-0.xml", urlset(&[format!("{}/a", base)])).await;

    let result = resolver().discover(&CancelToken::new(), &base).await.unwrap();
    assert_eq!(result.method, "sitemap-nextjs");
}

#[tokio::test]
async fn test_robots_sitemap_fallback() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_body(
        &server,
        "/robots.txt",
        "# crawl rules\nUser-agent: *\nDisallow: /admin\n\nSITEMAP: /maps/custom.xml # main map\n"
            .to_string(),
    )
    .await;

    let result = resolver().discover(&CancelToken::new(), &base).await.unwrap();
    assert_eq!(result.method, ROBOTS_METHOD);
    assert_eq!(result.kind, ManifestKind::Sitemap);
    assert_eq!(result.resolved_url, format!("{}/maps/custom.xml", base));
}

#[tokio::test]
async fn test_robots_directive_preferred_over_probe() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_body(&server, "/sitemap.xml", urlset(&[format!("{}/a", base)])).await;
    mount_body(
        &server,
        "/robots.txt",
        format!("Sitemap: {}/sitemap_index.xml\n", base),
    )
    .await;

    let result = resolver().discover(&CancelToken::new(), &base).await.unwrap();
    assert_eq!(result.method, ROBOTS_METHOD);
    assert_eq!(result.resolved_url, format!("{}/sitemap_index.xml", base));
}

#[tokio::test]
async fn test_no_source_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body>Not here</body></html>"),
        )
        .mount(&server)
        .await;

    let err = resolver()
        .discover(&CancelToken::new(), &server.uri())
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::NoSourceFound { .. }));
}
