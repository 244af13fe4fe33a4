//! Request matchers and match sets
//!
//! A matcher is a named pure predicate over two requests. A cassette
//! compares incoming requests against stored ones under an ordered match
//! set: the pair matches iff every matcher in the set agrees. Mismatch
//! reporting is diagnostic only and never alters control flow.

use std::collections::HashMap;
use std::sync::Arc;

use crate::http::Request;
use crate::{ReelError, Result};

/// A named comparison predicate over two requests
pub type Matcher = Arc<dyn Fn(&Request, &Request) -> bool + Send + Sync>;

/// Matcher names a cassette compares under when none are configured
pub const DEFAULT_MATCH_ON: &[&str] = &["method", "scheme", "host", "port", "path", "query"];

/// Registry of named matchers.
///
/// Starts with the built-ins (`method`, `scheme`, `host`, `port`, `path`,
/// `query`, `uri`, `headers`, `body`); custom matchers may be registered
/// under new names at configuration time.
pub struct MatcherRegistry {
    matchers: HashMap<String, Matcher>,
}

impl MatcherRegistry {
    /// Create a registry holding the built-in matchers
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            matchers: HashMap::new(),
        };

        registry.register("method", |a, b| a.method() == b.method());
        registry.register("scheme", |a, b| a.scheme() == b.scheme());
        registry.register("host", |a, b| a.host() == b.host());
        registry.register("port", |a, b| a.port() == b.port());
        registry.register("path", |a, b| a.path() == b.path());
        registry.register("query", |a, b| {
            a.sorted_query_pairs() == b.sorted_query_pairs()
        });
        registry.register("uri", |a, b| a.uri() == b.uri());
        registry.register("headers", |a, b| a.headers() == b.headers());
        registry.register("body", match_body);

        registry
    }

    /// Register a matcher under `name`, replacing any existing one
    pub fn register(
        &mut self,
        name: impl Into<String>,
        matcher: impl Fn(&Request, &Request) -> bool + Send + Sync + 'static,
    ) {
        self.matchers.insert(name.into(), Arc::new(matcher));
    }

    /// Look up a matcher by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Matcher> {
        self.matchers.get(name).map(Arc::clone)
    }

    /// Registered matcher names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.matchers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for MatcherRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// An ordered set of named matchers resolved from a registry.
///
/// A request pair matches under the set iff every member returns true; no
/// matcher is optional.
#[derive(Clone)]
pub struct MatchSet {
    matchers: Vec<(String, Matcher)>,
}

impl MatchSet {
    /// Resolve `names` against `registry`, preserving order
    ///
    /// # Errors
    ///
    /// Returns `ReelError::Config` for an unknown matcher name
    pub fn from_names<S: AsRef<str>>(names: &[S], registry: &MatcherRegistry) -> Result<Self> {
        let mut matchers = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let matcher = registry.get(name).ok_or_else(|| {
                ReelError::Config(format!(
                    "unknown matcher '{name}' (registered: {})",
                    registry.names().join(", ")
                ))
            })?;
            matchers.push((name.to_string(), matcher));
        }
        Ok(Self { matchers })
    }

    /// Whether `a` and `b` agree under every matcher in the set
    #[must_use]
    pub fn matches(&self, a: &Request, b: &Request) -> bool {
        self.matchers.iter().all(|(_, m)| m(a, b))
    }

    /// Names of the matchers that disagree, for diagnostics
    #[must_use]
    pub fn mismatches(&self, a: &Request, b: &Request) -> Vec<String> {
        self.matchers
            .iter()
            .filter(|(_, m)| !m(a, b))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Matcher names in set order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.matchers.iter().map(|(n, _)| n.as_str()).collect()
    }
}

/// Media type of a request, lowercased with parameters stripped
pub(crate) fn media_type(request: &Request) -> Option<String> {
    request
        .content_type()
        .map(|ct| ct.split(';').next().unwrap_or("").trim().to_lowercase())
}

fn is_form(media: &str) -> bool {
    media == "application/x-www-form-urlencoded"
}

fn is_json(media: &str) -> bool {
    media == "application/json" || media.ends_with("+json")
}

/// Decoded form pairs sorted for order-insensitive, duplicate-aware compare
fn form_pairs(body: &[u8]) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(body)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort_unstable();
    pairs
}

/// Body matcher: raw bytes, except form-encoded and JSON content types
/// compare semantically, ignoring key order. The content type is read
/// case-insensitively from either request.
fn match_body(a: &Request, b: &Request) -> bool {
    let media = media_type(a).or_else(|| media_type(b));

    match media.as_deref() {
        Some(m) if is_form(m) => form_pairs(a.body()) == form_pairs(b.body()),
        Some(m) if is_json(m) => {
            let left = serde_json::from_slice::<serde_json::Value>(a.body());
            let right = serde_json::from_slice::<serde_json::Value>(b.body());
            match (left, right) {
                (Ok(left), Ok(right)) => left == right,
                _ => a.body() == b.body(),
            }
        }
        _ => a.body() == b.body(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HeaderMap;
    use proptest::prelude::*;

    fn request(method: &str, uri: &str) -> Request {
        Request::new(method, uri, HeaderMap::new(), Vec::new()).unwrap()
    }

    fn request_with_body(uri: &str, content_type: &str, body: &[u8]) -> Request {
        Request::new(
            "POST",
            uri,
            HeaderMap::from_pairs([("Content-Type", content_type)]),
            body.to_vec(),
        )
        .unwrap()
    }

    fn set(names: &[&str]) -> MatchSet {
        MatchSet::from_names(names, &MatcherRegistry::with_builtins()).unwrap()
    }

    #[test]
    fn test_method_matcher() {
        let matchers = set(&["method"]);
        let a = request("GET", "http://x.com/a");
        let b = request("GET", "http://y.com/b");
        let c = request("POST", "http://x.com/a");

        assert!(matchers.matches(&a, &b));
        assert!(!matchers.matches(&a, &c));
    }

    #[test]
    fn test_host_and_port_matchers() {
        let matchers = set(&["host", "port"]);
        let a = request("GET", "http://example.com/a");
        let b = request("GET", "http://example.com:80/b");
        let c = request("GET", "http://example.com:8080/a");

        // Port 80 is the http default, so a and b agree
        assert!(matchers.matches(&a, &b));
        assert!(!matchers.matches(&a, &c));
    }

    #[test]
    fn test_query_matcher_order_insensitive() {
        let matchers = set(&["query"]);
        let a = request("GET", "http://x.com/?a=1&b=2");
        let b = request("GET", "http://x.com/?b=2&a=1");
        let c = request("GET", "http://x.com/?a=1&b=3");

        assert!(matchers.matches(&a, &b));
        assert!(!matchers.matches(&a, &c));
    }

    #[test]
    fn test_query_matcher_duplicate_aware() {
        let matchers = set(&["query"]);
        let a = request("GET", "http://x.com/?k=1&k=1");
        let b = request("GET", "http://x.com/?k=1");

        assert!(!matchers.matches(&a, &b));
    }

    #[test]
    fn test_uri_matcher_full_string() {
        let matchers = set(&["uri"]);
        let a = request("GET", "http://x.com/path?a=1");
        let b = request("GET", "http://x.com/path?a=1");
        let c = request("GET", "http://x.com/path?a=2");

        assert!(matchers.matches(&a, &b));
        assert!(!matchers.matches(&a, &c));
    }

    #[test]
    fn test_headers_matcher() {
        let matchers = set(&["headers"]);
        let a = Request::new(
            "GET",
            "http://x.com/",
            HeaderMap::from_pairs([("Accept", "*/*")]),
            Vec::new(),
        )
        .unwrap();
        let b = Request::new(
            "GET",
            "http://x.com/",
            HeaderMap::from_pairs([("accept", "*/*")]),
            Vec::new(),
        )
        .unwrap();
        let c = Request::new(
            "GET",
            "http://x.com/",
            HeaderMap::from_pairs([("Accept", "text/html")]),
            Vec::new(),
        )
        .unwrap();

        assert!(matchers.matches(&a, &b));
        assert!(!matchers.matches(&a, &c));
    }

    #[test]
    fn test_body_matcher_raw_bytes() {
        let matchers = set(&["body"]);
        let a = request_with_body("http://x.com/", "text/plain", b"payload");
        let b = request_with_body("http://x.com/", "text/plain", b"payload");
        let c = request_with_body("http://x.com/", "text/plain", b"other");

        assert!(matchers.matches(&a, &b));
        assert!(!matchers.matches(&a, &c));
    }

    #[test]
    fn test_body_matcher_json_key_order() {
        let matchers = set(&["body"]);
        let a = request_with_body("http://x.com/", "application/json", br#"{"a":1,"b":2}"#);
        let b = request_with_body("http://x.com/", "application/json", br#"{"b":2,"a":1}"#);

        assert!(matchers.matches(&a, &b));
    }

    #[test]
    fn test_body_matcher_content_type_from_either_request() {
        let matchers = set(&["body"]);
        let typed = request_with_body("http://x.com/", "Application/JSON", br#"{"a":1,"b":2}"#);
        let untyped = Request::new(
            "POST",
            "http://x.com/",
            HeaderMap::new(),
            br#"{"b":2,"a":1}"#.to_vec(),
        )
        .unwrap();

        assert!(matchers.matches(&typed, &untyped));
        assert!(matchers.matches(&untyped, &typed));
    }

    #[test]
    fn test_body_matcher_form_encoded() {
        let matchers = set(&["body"]);
        let a = request_with_body(
            "http://x.com/",
            "application/x-www-form-urlencoded",
            b"a=1&b=2",
        );
        let b = request_with_body(
            "http://x.com/",
            "application/x-www-form-urlencoded; charset=utf-8",
            b"b=2&a=1",
        );

        assert!(matchers.matches(&a, &b));
    }

    #[test]
    fn test_custom_matcher_registration() {
        let mut registry = MatcherRegistry::with_builtins();
        registry.register("never", |_, _| false);

        let matchers = MatchSet::from_names(&["method", "never"], &registry).unwrap();
        let a = request("GET", "http://x.com/");

        assert!(!matchers.matches(&a, &a.clone()));
        assert_eq!(matchers.mismatches(&a, &a.clone()), vec!["never"]);
    }

    #[test]
    fn test_unknown_matcher_rejected() {
        let registry = MatcherRegistry::with_builtins();
        let result = MatchSet::from_names(&["method", "nonsense"], &registry);

        assert!(result.is_err());
    }

    #[test]
    fn test_mismatches_reports_every_disagreement() {
        let matchers = set(&["method", "host", "path"]);
        let a = request("GET", "http://x.com/a");
        let b = request("POST", "http://y.com/a");

        assert_eq!(matchers.mismatches(&a, &b), vec!["method", "host"]);
        assert!(matchers.mismatches(&a, &a.clone()).is_empty());
    }

    proptest! {
        /// Any request compared to an unmodified copy of itself matches
        /// under the full built-in matcher set.
        #[test]
        fn prop_match_is_reflexive(
            method in "GET|POST|PUT|DELETE",
            host in "[a-z]{1,12}\\.(com|org)",
            path in "(/[a-z0-9]{1,8}){0,3}",
            query in proptest::collection::vec(("[a-z]{1,6}", "[a-z0-9]{0,6}"), 0..4),
            body in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let query_string = query
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&");
            let uri = if query_string.is_empty() {
                format!("http://{host}{path}")
            } else {
                format!("http://{host}{path}?{query_string}")
            };

            let request = Request::new(
                &method,
                &uri,
                HeaderMap::from_pairs([("Accept", "*/*")]),
                body,
            )
            .unwrap();

            let registry = MatcherRegistry::with_builtins();
            let all = MatchSet::from_names(
                &["method", "scheme", "host", "port", "path", "query", "uri", "headers", "body"],
                &registry,
            )
            .unwrap();

            prop_assert!(all.matches(&request, &request.clone()));
            prop_assert!(all.mismatches(&request, &request.clone()).is_empty());
        }
    }
}
