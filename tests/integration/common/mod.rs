#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sumi_harvest::config::{Config, FetchConfig, HarvestConfig, RetrySettings, SourceConfig};
use sumi_harvest::crawler::{Coordinator, Fetcher, HarvestOptions, HttpFetcher};
use sumi_harvest::manifest::ManifestKind;
use sumi_harvest::output::{LeafDocument, ProcessedOutput, Processor};
use sumi_harvest::{CancelToken, HarvestError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration writing its ledger into `dir`
pub fn test_config(dir: &Path, sources: Vec<SourceConfig>, max_items: Option<usize>) -> Config {
    Config {
        harvest: HarvestConfig {
            concurrency: 4,
            max_items,
            ledger_path: dir.join("ledger.json").to_string_lossy().into_owned(),
            output_dir: dir.join("out").to_string_lossy().into_owned(),
        },
        fetch: FetchConfig::default(),
        retry: RetrySettings {
            max_attempts: 2,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
            jitter: 0.0,
        },
        sources,
    }
}

/// A source whose manifest kind is known, skipping discovery
pub fn sitemap_source(url: String) -> SourceConfig {
    SourceConfig {
        url,
        kind: Some(ManifestKind::Sitemap),
        allowed_domains: Vec::new(),
    }
}

pub fn discovered_source(url: String) -> SourceConfig {
    SourceConfig {
        url,
        kind: None,
        allowed_domains: Vec::new(),
    }
}

pub fn urlset(urls: &[String]) -> String {
    let body: String = urls
        .iter()
        .map(|u| format!("<url><loc>{}</loc></url>", u))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{}</urlset>"#,
        body
    )
}

pub fn sitemap_index(urls: &[String]) -> String {
    let body: String = urls
        .iter()
        .map(|u| format!("<sitemap><loc>{}</loc></sitemap>", u))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{}</sitemapindex>"#,
        body
    )
}

/// Absolute URLs `<base>/<prefix>/1` .. `<base>/<prefix>/<count>`
pub fn page_urls(base: &str, prefix: &str, count: usize) -> Vec<String> {
    (1..=count)
        .map(|i| format!("{}/{}/{}", base, prefix, i))
        .collect()
}

/// Mounts a 200 response with `body` at `route`
pub async fn mount_body(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Mounts one page per URL whose body names its path
pub async fn mount_pages(server: &MockServer, urls: &[String]) {
    for url in urls {
        let route = url::Url::parse(url).unwrap().path().to_string();
        mount_body(server, &route, format!("page {}", route)).await;
    }
}

/// Paths of every request the server received, in arrival order
pub async fn request_paths(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect()
}

pub fn http_fetcher() -> Arc<dyn Fetcher> {
    Arc::new(HttpFetcher::new(&FetchConfig::default()).unwrap())
}

/// Processor that records what it saw instead of writing files
#[derive(Default)]
pub struct RecordingProcessor {
    pub seen: Mutex<Vec<String>>,
    pub in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    pub delay: Option<Duration>,
}

impl RecordingProcessor {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn seen(&self) -> Vec<String> {
        let mut seen = self.seen.lock().unwrap().clone();
        seen.sort();
        seen
    }
}

#[async_trait]
impl Processor for RecordingProcessor {
    async fn process(
        &self,
        _cancel: &CancelToken,
        doc: &LeafDocument,
    ) -> Result<ProcessedOutput, HarvestError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.seen.lock().unwrap().push(doc.url.clone());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(ProcessedOutput {
            file_path: format!("memory/{}", doc.content_hash),
        })
    }
}

pub fn coordinator(
    config: Config,
    options: HarvestOptions,
    processor: Arc<RecordingProcessor>,
) -> Coordinator {
    Coordinator::with_parts(config, options, http_fetcher(), processor)
}
