use crate::url::normalize::parse_loose;
use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_harvest::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns true if two locators name the same host
///
/// Hosts are compared after stripping a single leading `www.`; every other
/// subdomain stays distinct, so `docs.example.com` and `example.com` are
/// different. Scheme and port are ignored. Unparseable input is never
/// same-origin.
pub fn same_origin(a: &str, b: &str) -> bool {
    let (Ok(a), Ok(b)) = (parse_loose(a), parse_loose(b)) else {
        return false;
    };

    let host = |u: &Url| {
        extract_domain(u).map(|h| match h.strip_prefix("www.") {
            Some(rest) => rest.to_string(),
            None => h.clone(),
        })
    };

    host(&a).is_some() && host(&a) == host(&b)
}

/// Returns true if two locators share the same approximate base domain
///
/// This is the loose comparison: each host is reduced to its last two
/// dot-separated labels (see [`base_domain`]). Scheme and port are ignored.
///
/// The reduction is an approximation that is wrong for multi-part public
/// suffixes: `a.example.co.uk` and `b.other.co.uk` both reduce to `co.uk`
/// and compare equal. Call sites rely on this loose behavior.
pub fn same_registrable_domain(a: &str, b: &str) -> bool {
    let (Ok(a), Ok(b)) = (parse_loose(a), parse_loose(b)) else {
        return false;
    };

    match (extract_domain(&a), extract_domain(&b)) {
        (Some(ha), Some(hb)) => base_domain(&ha) == base_domain(&hb),
        _ => false,
    }
}

/// Reduces a host to its last two dot-separated labels
///
/// IP literals and single-label hosts are returned unchanged.
///
/// ```
/// use sumi_harvest::url::base_domain;
///
/// assert_eq!(base_domain("api.docs.example.com"), "example.com");
/// assert_eq!(base_domain("localhost"), "localhost");
/// // Known limitation for multi-part suffixes
/// assert_eq!(base_domain("shop.example.co.uk"), "co.uk");
/// ```
pub fn base_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_lowercase();

    if host.parse::<std::net::IpAddr>().is_ok() || host.starts_with('[') {
        return host;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        host
    } else {
        labels[labels.len() - 2..].join(".")
    }
}
