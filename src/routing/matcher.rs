//! Route matching logic.
//!
//! # Responsibilities
//! - Match host (exact match, case-insensitive)
//! - Match path prefix (case-sensitive)
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Host comes from the `host` header, or the URI authority for HTTP/2
//! - Empty condition = always matches (wildcard)
//! - No regex to guarantee O(n) matching

use axum::http::request::Parts;

/// Trait for matching request heads against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    fn matches(&self, head: &Parts) -> bool;
}

/// Matches the request host.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    /// The host is normalized to lowercase for case-insensitive matching.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_lowercase(),
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, head: &Parts) -> bool {
        let header = head.headers.get("host").and_then(|h| h.to_str().ok());
        let authority = head.uri.authority().map(|a| a.as_str());
        header
            .or(authority)
            .map(|h| h.eq_ignore_ascii_case(&self.expected_host))
            .unwrap_or(false)
    }
}

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, head: &Parts) -> bool {
        head.uri.path().starts_with(&self.prefix)
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, head: &Parts) -> bool {
        self.matchers.iter().all(|m| m.matches(head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn head(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_host_matcher() {
        let matcher = HostMatcher::new("example.com");

        assert!(matcher.matches(&head(Request::builder().header("Host", "example.com"))));
        assert!(matcher.matches(&head(Request::builder().header("Host", "EXAMPLE.COM"))));
        assert!(!matcher.matches(&head(Request::builder().header("Host", "other.com"))));
    }

    #[test]
    fn test_host_from_authority() {
        let matcher = HostMatcher::new("example.com");
        assert!(matcher.matches(&head(Request::builder().uri("https://example.com/x"))));
    }

    #[test]
    fn test_path_matcher() {
        let matcher = PathPrefixMatcher::new("/api");

        assert!(matcher.matches(&head(Request::builder().uri("http://example.com/api/v1"))));
        assert!(!matcher.matches(&head(Request::builder().uri("http://example.com/images"))));
    }

    #[test]
    fn test_empty_and_matches_everything() {
        let matcher = AndMatcher::new(Vec::new());
        assert!(matcher.matches(&head(Request::builder().uri("/anything"))));
    }
}
