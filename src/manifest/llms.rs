//! llms.txt link list parsing
//!
//! An llms.txt file is Markdown: a title, an optional summary and sections of
//! `- [name](url): notes` bullets. Every Markdown link outside fenced code
//! blocks is a leaf.

use crate::manifest::ManifestEntry;
use regex::Regex;
use std::sync::OnceLock;

static LINK_PATTERN: OnceLock<Regex> = OnceLock::new();

fn link_pattern() -> &'static Regex {
    LINK_PATTERN.get_or_init(|| {
        Regex::new(r#"(!?)\[[^\]]*\]\(\s*<?([^)\s>]+)>?(?:\s+"[^"]*")?\s*\)"#)
            .expect("llms.txt link pattern is a valid regex")
    })
}

/// Extracts link targets in document order
///
/// Image links (`![alt](src)`), fragment-only links and non-web schemes are
/// skipped.
pub fn parse(body: &str) -> Vec<ManifestEntry> {
    let pattern = link_pattern();

    let mut entries = Vec::new();
    let mut in_fence = false;

    for line in body.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        for caps in pattern.captures_iter(line) {
            if caps.get(1).map_or(false, |m| !m.as_str().is_empty()) {
                continue;
            }
            let Some(target) = caps.get(2).map(|m| m.as_str()) else {
                continue;
            };
            if is_followable(target) {
                entries.push(ManifestEntry::Leaf {
                    url: target.to_string(),
                    last_modified: None,
                });
            }
        }
    }

    entries
}

/// Returns true if the body has the shape of an llms.txt file
pub(crate) fn looks_like(body: &str) -> bool {
    let first = body.lines().map(str::trim).find(|l| !l.is_empty());
    match first {
        Some(line) if line.starts_with('#') => true,
        Some(_) => !parse(body).is_empty(),
        None => false,
    }
}

fn is_followable(target: &str) -> bool {
    !(target.starts_with('#')
        || target.starts_with("mailto:")
        || target.starts_with("tel:")
        || target.starts_with("javascript:")
        || target.starts_with("data:"))
}
