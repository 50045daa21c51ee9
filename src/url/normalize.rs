use crate::UrlError;
use url::Url;

/// Scheme inserted when a locator carries none
pub const DEFAULT_SCHEME: &str = "https";

/// Canonicalizes a raw locator into the identity string used as every
/// cache, ledger and dedup key
///
/// # Canonicalization Steps
///
/// 1. Insert `https://` when the input has no scheme (host-only input) and
///    `https:` for scheme-relative input (`//host/path`)
/// 2. Parse; reject only input that cannot be parsed as a URI at all
/// 3. Lowercase the host
/// 4. Drop the port when it is the default for the scheme
/// 5. Collapse the path: remove dot segments and duplicate slashes
/// 6. Drop the trailing slash, except for the root path which keeps one
/// 7. Drop the fragment
/// 8. Keep the query string exactly as given
///
/// Unlike a crawl frontier normalizer this does not strip `www.`, rewrite
/// the scheme or touch query parameters: two locators only collapse when
/// they denote the same resource.
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::canonicalize;
///
/// assert_eq!(canonicalize("example.com").unwrap(), "https://example.com/");
/// assert_eq!(
///     canonicalize("https://EXAMPLE.com:443/").unwrap(),
///     "https://example.com/"
/// );
/// assert_eq!(
///     canonicalize("http://example.com:80/docs/./api/#intro").unwrap(),
///     "http://example.com/docs/api"
/// );
/// ```
pub fn canonicalize(raw: &str) -> Result<String, UrlError> {
    let mut url = parse_loose(raw)?;

    if let Some(host) = url.host_str() {
        let lowered = host.to_lowercase();
        if lowered != host {
            url.set_host(Some(&lowered))
                .map_err(|e| UrlError::Malformed(format!("{}: {}", raw, e)))?;
        }
    }

    // Default ports (80 for http, 443 for https) are already dropped by Url::parse

    if !url.cannot_be_a_base() {
        let path = normalize_path(url.path());
        url.set_path(&path);
    }

    url.set_fragment(None);

    Ok(url.to_string())
}

/// Parses a locator, inserting the default scheme when it is missing
pub(crate) fn parse_loose(raw: &str) -> Result<Url, UrlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Malformed("empty locator".to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        format!("{}://{}", DEFAULT_SCHEME, rest)
    } else {
        format!("{}://{}", DEFAULT_SCHEME, trimmed)
    };

    Url::parse(&candidate).map_err(|e| UrlError::Malformed(format!("{}: {}", raw, e)))
}

/// Removes dot segments and empty segments; drops the trailing slash unless
/// the result is the root
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}
