use crate::url::normalize::parse_loose;
use crate::UrlError;

/// Resolves `reference` against `base` (RFC 3986 reference resolution)
///
/// A base whose last path segment has no trailing slash and does not look
/// like a file (no `.ext` suffix) is treated as a directory: a `/` is
/// appended before resolving. Documentation sites usually serve
/// `/docs/api` and `/docs/api/` as the same page, so `../x` from
/// `/docs/api` resolves to `/docs/x` rather than `/x`.
///
/// The base may be host-only or scheme-relative; it gets the default scheme
/// the same way [`crate::url::canonicalize`] does.
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::resolve_relative;
///
/// assert_eq!(
///     resolve_relative("https://example.com/docs/api", "../x").unwrap(),
///     "https://example.com/docs/x"
/// );
/// assert_eq!(
///     resolve_relative("https://example.com/docs/index.html", "guide").unwrap(),
///     "https://example.com/docs/guide"
/// );
/// ```
pub fn resolve_relative(base: &str, reference: &str) -> Result<String, UrlError> {
    let mut base_url = parse_loose(base)?;

    if !base_url.cannot_be_a_base() {
        let path = base_url.path().to_string();
        if !path.ends_with('/') && !last_segment_is_file(&path) {
            base_url.set_path(&format!("{}/", path));
        }
    }

    base_url
        .join(reference.trim())
        .map(|u| u.to_string())
        .map_err(|e| UrlError::Malformed(format!("{} against {}: {}", reference, base, e)))
}

/// Returns true if the last path segment ends in something that looks like a
/// file extension (1 to 5 alphanumeric characters after a dot)
fn last_segment_is_file(path: &str) -> bool {
    let last = path.rsplit('/').next().unwrap_or("");
    match last.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}
