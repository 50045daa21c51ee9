//! HTML link list parsing
//!
//! A plain HTML page used as a manifest: every followable `<a href>` on the
//! same base domain is a leaf.

use crate::manifest::ManifestEntry;
use crate::url::{resolve_relative, same_registrable_domain};
use scraper::{Html, Selector};

/// Extracts leaves from an HTML page
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags anywhere in the document
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links and data URIs
/// - Fragment-only links
/// - Links whose host has a different base domain than `base`
///
/// Relative links are resolved against `base` with
/// [`resolve_relative`](crate::url::resolve_relative).
pub fn parse(html: &str, base: &str) -> Vec<ManifestEntry> {
    let document = Html::parse_document(html);
    let mut entries = Vec::new();

    let Ok(selector) = Selector::parse("a[href]") else {
        return entries;
    };

    for element in document.select(&selector) {
        if element.value().attr("download").is_some() {
            continue;
        }

        let Some(href) = element.value().attr("href") else {
            continue;
        };

        if let Some(url) = resolve_link(href, base) {
            entries.push(ManifestEntry::Leaf {
                url,
                last_modified: None,
            });
        }
    }

    entries
}

pub(crate) fn looks_like(body: &str) -> bool {
    let head: String = body.chars().take(1024).collect::<String>().to_ascii_lowercase();
    head.contains("<html") || head.contains("<!doctype html") || body.contains("<a ")
}

/// Resolves a link href to an absolute URL, or `None` if it is excluded
fn resolve_link(href: &str, base: &str) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute = resolve_relative(base, href).ok()?;
    if !(absolute.starts_with("http://") || absolute.starts_with("https://")) {
        return None;
    }

    same_registrable_domain(base, &absolute).then_some(absolute)
}
