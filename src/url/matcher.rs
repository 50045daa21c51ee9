use url::Url;

/// Checks if a host matches a domain pattern
///
/// Two kinds of patterns are supported:
/// 1. Exact: "docs.rs" matches only "docs.rs"
/// 2. Wildcard: "*.example.com" matches "example.com" and any subdomain of it
///
/// Both sides are compared case-insensitively.
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::matches_wildcard;
///
/// assert!(matches_wildcard("docs.rs", "DOCS.rs"));
/// assert!(matches_wildcard("*.example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "api.v2.example.com"));
/// assert!(!matches_wildcard("*.example.com", "myexample.com"));
/// ```
pub fn matches_wildcard(pattern: &str, host: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let host = host.to_ascii_lowercase();

    match pattern.strip_prefix("*.") {
        Some(base) => host == base || host.ends_with(&format!(".{}", base)),
        None => host == pattern,
    }
}

/// Returns true if the host of `url` matches any of `patterns`
///
/// An empty pattern list allows every host. URLs without a host never match
/// a non-empty list.
pub fn host_allowed(patterns: &[String], url: &Url) -> bool {
    if patterns.is_empty() {
        return true;
    }

    match url.host_str() {
        Some(host) => patterns.iter().any(|p| matches_wildcard(p, host)),
        None => false,
    }
}
