//! Manifest parsing
//!
//! A manifest is any document that lists documentation pages: an XML sitemap
//! (or sitemap index), an llms.txt link list, an mkdocs search index or a
//! plain HTML page of links. Parsing turns it into [`ManifestEntry`] values
//! whose URLs are resolved against the manifest's own location.

mod links;
mod llms;
mod search_index;
mod sitemap;

use crate::url::resolve_relative;
use crate::HarvestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The format of a manifest document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestKind {
    Llms,
    Sitemap,
    SearchIndex,
    Links,
}

impl ManifestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llms => "llms",
            Self::Sitemap => "sitemap",
            Self::SearchIndex => "search-index",
            Self::Links => "links",
        }
    }
}

impl fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManifestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "llms" | "llms.txt" => Ok(Self::Llms),
            "sitemap" => Ok(Self::Sitemap),
            "search-index" | "mkdocs" => Ok(Self::SearchIndex),
            "links" | "html" => Ok(Self::Links),
            other => Err(format!("unknown manifest kind: {}", other)),
        }
    }
}

/// One entry of a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestEntry {
    /// A nested manifest of the same kind
    Index { url: String },
    /// A documentation page
    Leaf {
        url: String,
        last_modified: Option<String>,
    },
}

impl ManifestEntry {
    pub fn url(&self) -> &str {
        match self {
            Self::Index { url } | Self::Leaf { url, .. } => url,
        }
    }

    pub fn is_index(&self) -> bool {
        matches!(self, Self::Index { .. })
    }
}

/// Returns true if `body` has the shape of a `kind` manifest
///
/// This is the content check behind discovery probes: a 200 response that
/// is really an HTML error page never qualifies as a sitemap, llms.txt or
/// search index.
pub fn looks_like(kind: ManifestKind, body: &str) -> bool {
    match kind {
        ManifestKind::Sitemap => {
            !is_html(body) && (body.contains("<urlset") || body.contains("<sitemapindex"))
        }
        ManifestKind::Llms => !is_html(body) && llms::looks_like(body),
        ManifestKind::SearchIndex => search_index::looks_like(body),
        ManifestKind::Links => links::looks_like(body),
    }
}

/// Parses a manifest fetched from `manifest_url`
///
/// Entry URLs are resolved to absolute form; entries that cannot be resolved
/// are skipped. Identity canonicalization is left to the caller.
pub fn parse_manifest(
    kind: ManifestKind,
    manifest_url: &str,
    body: &str,
) -> Result<Vec<ManifestEntry>, HarvestError> {
    let parse_error = |message: String| HarvestError::ManifestParse {
        url: manifest_url.to_string(),
        message,
    };

    let raw = match kind {
        ManifestKind::Sitemap => sitemap::parse(body).map_err(parse_error)?,
        ManifestKind::Llms => llms::parse(body),
        ManifestKind::SearchIndex => search_index::parse(body).map_err(parse_error)?,
        // Already resolved and filtered by the HTML parser
        ManifestKind::Links => return Ok(links::parse(body, manifest_url)),
    };

    let base = resolution_base(kind, manifest_url);
    Ok(raw
        .into_iter()
        .filter_map(|entry| resolve_entry(entry, &base))
        .collect())
}

/// mkdocs search locations are relative to the site root, not to the index
fn resolution_base(kind: ManifestKind, manifest_url: &str) -> String {
    const SEARCH_INDEX_SUFFIX: &str = "search/search_index.json";

    match kind {
        ManifestKind::SearchIndex => match manifest_url.strip_suffix(SEARCH_INDEX_SUFFIX) {
            Some(root) => root.to_string(),
            None => manifest_url.to_string(),
        },
        _ => manifest_url.to_string(),
    }
}

fn resolve_entry(entry: ManifestEntry, base: &str) -> Option<ManifestEntry> {
    let resolved = match resolve_relative(base, entry.url()) {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!("Skipping unresolvable manifest entry {}: {}", entry.url(), e);
            return None;
        }
    };

    Some(match entry {
        ManifestEntry::Index { .. } => ManifestEntry::Index { url: resolved },
        ManifestEntry::Leaf { last_modified, .. } => ManifestEntry::Leaf {
            url: resolved,
            last_modified,
        },
    })
}

fn is_html(body: &str) -> bool {
    let head = body.trim_start();
    let prefix: String = head.chars().take(15).collect::<String>().to_ascii_lowercase();
    prefix.starts_with("<!doctype html") || prefix.starts_with("<html")
}
