//! Robots.txt parser implementation
//!
//! Allow/disallow matching is delegated to the robotstxt crate; `Sitemap:`
//! directives are read directly since the matcher ignores them.

use crate::url::resolve_relative;
use robotstxt::DefaultMatcher;

/// Parsed robots.txt data
///
/// This is a wrapper around the robotstxt crate's matcher, providing a
/// simplified interface for checking if URLs are allowed and for reading
/// sitemap directives.
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
    /// Whether to allow all (true = allow all, false = parse content)
    allow_all: bool,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    ///
    /// This is used when robots.txt is missing or cannot be fetched.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Returns the raw robots.txt content
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - The absolute URL to check
    /// * `user_agent` - The user agent string
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Returns the `Sitemap:` directive values in file order
    ///
    /// # Parsing Rules
    ///
    /// - The `Sitemap` key is matched case-insensitively
    /// - Full-line `#` comments and trailing `# ...` comments are ignored
    /// - Blank lines and lines without a `key: value` shape are ignored
    /// - Relative values are resolved against `base`
    ///
    /// # Example
    ///
    /// ```
    /// use sumi_harvest::robots::ParsedRobots;
    ///
    /// let robots = ParsedRobots::from_content("SITEMAP: /sitemap.xml # main\n");
    /// assert_eq!(
    ///     robots.sitemaps("https://example.com/"),
    ///     vec!["https://example.com/sitemap.xml".to_string()]
    /// );
    /// ```
    pub fn sitemaps(&self, base: &str) -> Vec<String> {
        let mut sitemaps = Vec::new();

        for line in self.content.lines() {
            let line = match line.split_once('#') {
                Some((before, _)) => before,
                None => line,
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let Some((key, value)) = trimmed.split_once(':') else {
                continue;
            };
            if !key.trim().eq_ignore_ascii_case("sitemap") {
                continue;
            }

            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            match resolve_relative(base, value) {
                Ok(url) => sitemaps.push(url),
                Err(e) => tracing::debug!("Ignoring unusable Sitemap directive {}: {}", value, e),
            }
        }

        sitemaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGENT: &str = "sumi-harvest";

    #[test]
    fn test_allow_all() {
        let robots = ParsedRobots::allow_all();
        assert!(robots.is_allowed("https://example.com/any/path", AGENT));
        assert!(robots.sitemaps("https://example.com/").is_empty());
    }

    #[test]
    fn test_parse_disallow_specific() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /admin");
        assert!(robots.is_allowed("https://example.com/", AGENT));
        assert!(robots.is_allowed("https://example.com/page", AGENT));
        assert!(!robots.is_allowed("https://example.com/admin", AGENT));
        assert!(!robots.is_allowed("https://example.com/admin/users", AGENT));
    }

    #[test]
    fn test_parse_allow_and_disallow() {
        let robots =
            ParsedRobots::from_content("User-agent: *\nDisallow: /private\nAllow: /private/public");
        assert!(!robots.is_allowed("https://example.com/private", AGENT));
        assert!(robots.is_allowed("https://example.com/private/public", AGENT));
    }

    #[test]
    fn test_parse_specific_user_agent() {
        let robots =
            ParsedRobots::from_content("User-agent: BadBot\nDisallow: /\n\nUser-agent: *\nAllow: /");
        assert!(robots.is_allowed("https://example.com/page", "GoodBot"));
        assert!(!robots.is_allowed("https://example.com/page", "BadBot"));
    }

    #[test]
    fn test_empty_robots_txt() {
        let robots = ParsedRobots::from_content("");
        assert!(robots.is_allowed("https://example.com/any/path", AGENT));
    }

    #[test]
    fn test_sitemaps_in_order_with_comments() {
        let content = "\
# Full line comment with Sitemap: https://example.com/ignored.xml
User-agent: *
Disallow: /private

sitemap: https://example.com/sitemap.xml   # primary
Sitemap:https://example.com/news-sitemap.xml
SiteMap: /relative/sitemap.xml
Sitemap:
";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(
            robots.sitemaps("https://example.com/"),
            vec![
                "https://example.com/sitemap.xml",
                "https://example.com/news-sitemap.xml",
                "https://example.com/relative/sitemap.xml",
            ]
        );
    }

    #[test]
    fn test_no_sitemap_directives() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow:");
        assert!(robots.sitemaps("https://example.com/").is_empty());
    }
}
