//! mkdocs `search/search_index.json` parsing

use crate::manifest::ManifestEntry;
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Deserialize)]
struct SearchIndex {
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    #[serde(default)]
    location: String,
}

/// Extracts one leaf per page from an mkdocs search index
///
/// mkdocs emits one document per heading (`page/#section`); locations are
/// reduced to their page by dropping the fragment and deduplicated. An empty
/// location denotes the site root and is returned as `./`.
pub fn parse(body: &str) -> Result<Vec<ManifestEntry>, String> {
    let index: SearchIndex = serde_json::from_str(body).map_err(|e| e.to_string())?;

    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for doc in index.docs {
        let page = match doc.location.split_once('#') {
            Some((page, _)) => page,
            None => doc.location.as_str(),
        };
        let page = if page.is_empty() { "./" } else { page };

        if seen.insert(page.to_string()) {
            entries.push(ManifestEntry::Leaf {
                url: page.to_string(),
                last_modified: None,
            });
        }
    }

    Ok(entries)
}

pub(crate) fn looks_like(body: &str) -> bool {
    serde_json::from_str::<SearchIndex>(body).is_ok()
}
