//! URL handling module for Sumi-Harvest
//!
//! This module provides canonical identities for locators, RFC 3986 relative
//! resolution, origin and base-domain comparisons, and wildcard host
//! matching for per-source domain filters.

mod domain;
mod matcher;
mod normalize;
mod resolve;

pub use domain::{base_domain, extract_domain, same_origin, same_registrable_domain};
pub use matcher::{host_allowed, matches_wildcard};
pub use normalize::{canonicalize, DEFAULT_SCHEME};
pub use resolve::resolve_relative;

/// Canonicalizes a batch of locators, dropping malformed ones and duplicates
///
/// Order of first occurrence is preserved. Malformed locators are logged at
/// debug level and skipped.
pub fn canonicalize_all<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for locator in raw {
        match canonicalize(locator.as_ref()) {
            Ok(id) => {
                if seen.insert(id.clone()) {
                    out.push(id);
                }
            }
            Err(e) => tracing::debug!("Skipping malformed locator {}: {}", locator.as_ref(), e),
        }
    }

    out
}
