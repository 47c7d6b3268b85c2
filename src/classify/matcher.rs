//! Request matching logic.
//!
//! # Responsibilities
//! - Match host header against an allow-list (case-insensitive)
//! - Match path prefix (case-sensitive)
//! - Require query parameters to be present
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Host matching is case-insensitive and accepts entries with or without port
//! - Empty host allow-list = always matches (wildcard)
//! - No regex to guarantee O(n) matching

use axum::http::{header, HeaderMap, Method, Uri};

/// The parts of a request the classifier looks at.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl RequestHead {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        Self { method, uri, headers }
    }

    /// Host header, falling back to the URI authority.
    pub fn host(&self) -> Option<&str> {
        self.headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
    }

    /// First value of a query parameter, undecoded.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.uri.query()?.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key == name).then_some(value)
        })
    }
}

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &RequestHead) -> bool;
}

/// Matches the Host header against a set of allowed hosts.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    allowed: Vec<String>,
}

impl HostMatcher {
    /// Hosts are normalized to lowercase for case-insensitive matching.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: hosts.into_iter().map(|h| h.into().to_lowercase()).collect(),
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, req: &RequestHead) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        let Some(host) = req.host().map(str::to_lowercase) else {
            return false;
        };
        let hostname = host.rsplit_once(':').map_or(host.as_str(), |(name, _)| name);
        self.allowed.iter().any(|allowed| *allowed == host || allowed == hostname)
    }
}

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, req: &RequestHead) -> bool {
        req.uri.path().starts_with(&self.prefix)
    }
}

/// Matches when a query parameter is present.
#[derive(Debug, Clone)]
pub struct QueryParamMatcher {
    name: &'static str,
}

impl QueryParamMatcher {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl Matcher for QueryParamMatcher {
    fn matches(&self, req: &RequestHead) -> bool {
        req.query_param(self.name).is_some()
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
    fn matches(&self, req: &RequestHead) -> bool {
        self.matchers.iter().all(|m| m.matches(req))
    }
}
