//! Which discovered references are worth fetching
//!
//! Every stylesheet and image reference found on a page goes through
//! [`UrlFilter::accept`] before it is fetched. References to third-party hosts
//! are dropped so CDN content is never uploaded as if it were part of the app
//! under test.

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Hosts treated as the app under test when no allow-list is configured
pub const LOCAL_HOSTNAMES: [&str; 3] = ["localhost", "127.0.0.1", "0.0.0.0"];

// Protocol-optional URL grammar. Groups: 1 protocol, 2 host, 3 port, 4 path.
const URL_PATTERN: &str = concat!(
    r"^((?:https?:)?//)",
    r"(",
    r"(?:[1-9]\d?|1\d\d|2[01]\d|22[0-3])",
    r"(?:\.(?:1?\d{1,2}|2[0-4]\d|25[0-5])){2}",
    r"(?:\.(?:[1-9]\d?|1\d\d|2[0-4]\d|25[0-4]))",
    r"|",
    r"(?:(?:[a-z\x{00a1}-\x{ffff}0-9]-*)*[a-z\x{00a1}-\x{ffff}0-9]+)",
    r"(?:\.(?:[a-z\x{00a1}-\x{ffff}0-9]-*)*[a-z\x{00a1}-\x{ffff}0-9]+)*",
    r")",
    r"(:\d{2,5})?",
    r#"(/[^\s"']*)?"#,
);

const PATH_PATTERN: &str = r#"^/[^\s"']*"#;

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!("(?i){}", URL_PATTERN)).expect("URL pattern compiles"))
}

fn path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PATH_PATTERN).expect("path pattern compiles"))
}

fn is_data_url(url: &str) -> bool {
    url.starts_with("data:")
}

/// Root-relative form of a page URL, used as the root resource's URL
///
/// Absolute URLs keep only their path (and query); anything the URL grammar
/// does not recognize, such as `about:srcdoc`, is forced into a path by
/// prefixing `/`.
pub fn current_path(current_url: &str) -> String {
    if let Some(caps) = url_regex().captures(current_url) {
        return caps
            .get(4)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
    }
    if current_url.starts_with('/') {
        current_url.to_string()
    } else {
        format!("/{}", current_url)
    }
}

/// Resolves and filters references relative to one page
#[derive(Debug, Clone)]
pub struct UrlFilter {
    page_url: String,
    /// Page URL without its fragment
    base: Option<Url>,
    page_path: String,
    asset_hostnames: Vec<String>,
}

impl UrlFilter {
    /// `asset_hostnames` replaces [`LOCAL_HOSTNAMES`] when given
    pub fn new(page_url: &str, asset_hostnames: Option<&[String]>) -> Self {
        let asset_hostnames = match asset_hostnames {
            Some(hosts) => hosts.iter().map(|h| h.to_lowercase()).collect(),
            None => LOCAL_HOSTNAMES.iter().map(|h| h.to_string()).collect(),
        };
        let base = Url::parse(page_url).ok().map(|mut url| {
            url.set_fragment(None);
            url
        });
        Self {
            page_url: page_url.to_string(),
            base,
            page_path: current_path(page_url),
            asset_hostnames,
        }
    }

    pub fn page_url(&self) -> &str {
        &self.page_url
    }

    pub fn page_path(&self) -> &str {
        &self.page_path
    }

    /// Resolve a reference against the page URL
    pub fn resolve(&self, reference: &str) -> Option<Url> {
        let mut resolved = match &self.base {
            Some(base) => base.join(reference).ok()?,
            None => Url::parse(reference).ok()?,
        };
        resolved.set_fragment(None);
        Some(resolved)
    }

    /// True when `url` is an absolute URL or root-relative path this page may
    /// fetch: not a data URI, and if absolute, on the page's own host:port or
    /// an allowed asset host.
    pub fn should_include(&self, url: &str) -> bool {
        if url.is_empty() || is_data_url(url) {
            return false;
        }
        if url_regex().is_match(url) {
            return self.is_allowed_host(url);
        }
        path_regex().is_match(url)
    }

    /// Run a raw reference through the whole pipeline
    ///
    /// Returns the resolved absolute URL, or `None` for blank, data, and
    /// self-referential references and anything [`should_include`] rejects.
    ///
    /// [`should_include`]: Self::should_include
    pub fn accept(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if reference.is_empty() || is_data_url(reference) {
            return None;
        }
        // Browsers fill blank src/url() values with the document URL
        if reference == self.page_path || reference == self.page_url {
            return None;
        }

        let resolved = self.resolve(reference)?;
        let is_page = resolved.as_str() == self.page_url
            || self.base.as_ref().is_some_and(|base| *base == resolved);
        if is_page {
            return None;
        }

        let resolved = resolved.to_string();
        if self.should_include(&resolved) {
            Some(resolved)
        } else {
            None
        }
    }

    /// Whether `url` is on exactly the page's host and port
    pub fn is_same_origin(&self, url: &str) -> bool {
        match (self.base.as_ref(), self.resolve(url)) {
            (Some(base), Some(other)) => same_host_port(base, &other),
            _ => false,
        }
    }

    /// The URL a fetched resource is registered under
    ///
    /// Same-origin resources are stored root-relative so the review service
    /// renders them against the snapshot rather than the live host.
    pub fn resource_url(&self, absolute: &str) -> String {
        match (self.base.as_ref(), Url::parse(absolute)) {
            (Some(base), Ok(url)) if same_host_port(base, &url) => path_and_query(&url),
            _ => absolute.to_string(),
        }
    }

    fn is_allowed_host(&self, url: &str) -> bool {
        let Some(resolved) = self.resolve(url) else {
            return false;
        };
        if let Some(base) = &self.base {
            if same_host_port(base, &resolved) {
                return true;
            }
        }
        resolved
            .host_str()
            .map(|host| self.asset_hostnames.iter().any(|allowed| allowed == host))
            .unwrap_or(false)
    }
}

fn same_host_port(a: &Url, b: &Url) -> bool {
    a.host_str().is_some()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_path() {
        assert_eq!(current_path("http://localhost:3000/about"), "/about");
        assert_eq!(current_path("http://localhost:3000/a?b=1"), "/a?b=1");
        assert_eq!(current_path("http://localhost:3000"), "/");
        assert_eq!(current_path("about:srcdoc"), "/about:srcdoc");
        assert_eq!(current_path("/already/a/path"), "/already/a/path");
    }

    #[test]
    fn test_same_host_and_port_only() {
        let filter = UrlFilter::new("http://foo:123/", None);
        assert!(filter.should_include("http://foo:123/"));
        assert!(filter.should_include("http://foo:123/images/a.png"));
        assert!(!filter.should_include("http://foo:1234/"));
        assert!(!filter.should_include("http://bar:123/"));
        assert!(!filter.should_include("https://cdn.example.com/a.css"));
    }

    #[test]
    fn test_local_hostnames_allowed_by_default() {
        let filter = UrlFilter::new("http://foo:123/", None);
        assert!(filter.should_include("http://localhost/a.css"));
        assert!(filter.should_include("http://127.0.0.1:8080/a.css"));
        assert!(filter.should_include("http://0.0.0.0:9000/a.css"));
    }

    #[test]
    fn test_configured_hostnames_replace_defaults() {
        let hosts = vec!["dev.local".to_string()];
        let filter = UrlFilter::new("http://foo:123/", Some(&hosts));
        assert!(filter.should_include("http://dev.local/"));
        assert!(filter.should_include("https://dev.local:4443/app.js"));
        assert!(!filter.should_include("http://other.local/"));
        assert!(!filter.should_include("http://localhost/"));
        assert!(filter.should_include("http://foo:123/still-ok.png"));
    }

    #[test]
    fn test_rejects_non_urls_and_data() {
        let filter = UrlFilter::new("http://foo:123/", None);
        assert!(!filter.should_include(""));
        assert!(!filter.should_include("bad-url/"));
        assert!(!filter.should_include("data:image/png;base64,iVBORw0KGgo="));
        assert!(filter.should_include("/css/base.css"));
    }

    #[test]
    fn test_accept_resolves_relative_references() {
        let filter = UrlFilter::new("http://localhost:3000/blog/post", None);
        assert_eq!(
            filter.accept("img/a.png").as_deref(),
            Some("http://localhost:3000/blog/img/a.png")
        );
        assert_eq!(
            filter.accept("/css/base.css").as_deref(),
            Some("http://localhost:3000/css/base.css")
        );
        assert_eq!(
            filter.accept("//localhost:3000/x.png#frag").as_deref(),
            Some("http://localhost:3000/x.png")
        );
    }

    #[test]
    fn test_accept_drops_self_references() {
        let filter = UrlFilter::new("http://localhost:3000/blog/post", None);
        assert!(filter.accept("").is_none());
        assert!(filter.accept("   ").is_none());
        assert!(filter.accept("/blog/post").is_none());
        assert!(filter.accept("http://localhost:3000/blog/post").is_none());
        assert!(filter.accept("post").is_none());
    }

    #[test]
    fn test_accept_drops_self_references_on_page_with_fragment() {
        let filter = UrlFilter::new("http://localhost:3000/p#top", None);
        assert!(filter.accept("#top").is_none());
        assert!(filter.accept("#other").is_none());
        assert!(filter.accept("http://localhost:3000/p").is_none());
        assert!(filter.accept("/p").is_none());
        assert_eq!(
            filter.accept("/p.png").as_deref(),
            Some("http://localhost:3000/p.png")
        );
    }

    #[test]
    fn test_accept_drops_third_party_and_data() {
        let filter = UrlFilter::new("http://localhost:3000/", None);
        assert!(filter.accept("https://fonts.example.com/a.woff").is_none());
        assert!(filter.accept("data:image/gif;base64,R0lGOD").is_none());
    }

    #[test]
    fn test_resource_url_form() {
        let filter = UrlFilter::new("http://localhost:3000/", None);
        assert_eq!(
            filter.resource_url("http://localhost:3000/css/base.css?v=2"),
            "/css/base.css?v=2"
        );
        assert_eq!(
            filter.resource_url("http://127.0.0.1:9000/logo.png"),
            "http://127.0.0.1:9000/logo.png"
        );
    }

    #[test]
    fn test_same_origin() {
        let filter = UrlFilter::new("http://localhost:3000/", None);
        assert!(filter.is_same_origin("/frame.html"));
        assert!(filter.is_same_origin("http://localhost:3000/frame.html"));
        assert!(!filter.is_same_origin("http://localhost:4000/frame.html"));
        assert!(!filter.is_same_origin("https://www.youtube.com/embed/x"));
    }
}
