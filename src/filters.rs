//! Request filter pipeline applied before matching and persistence
//!
//! Filters sanitize a live outgoing request, producing either a possibly
//! modified request or [`FilterOutcome::Drop`], meaning: do not record, do
//! not match against the cassette. The pipeline runs only on live requests;
//! interactions already read from disk are never re-filtered. Every
//! built-in transform is idempotent.

use std::sync::Arc;

use tracing::debug;

use crate::http::Request;
use crate::matching::media_type;

/// Result of running the filter pipeline over a request
#[derive(Debug, Clone)]
pub enum FilterOutcome {
    /// Use this (possibly modified) request for matching and persistence
    Keep(Request),
    /// Exclude the request from the cassette entirely
    Drop,
}

/// Final arbitrary filter stage: request in, request-or-drop out
pub type BeforeRecord = Arc<dyn Fn(Request) -> FilterOutcome + Send + Sync>;

/// Ordered pipeline of request transforms.
///
/// Stage order: strip headers, strip query parameters, strip POST body
/// parameters, ignore rules, then the before-record callback.
#[derive(Clone, Default)]
pub struct FilterChain {
    strip_headers: Vec<String>,
    strip_query_parameters: Vec<String>,
    strip_post_data_parameters: Vec<String>,
    ignore_hosts: Vec<String>,
    ignore_localhost: bool,
    before_record: Option<BeforeRecord>,
}

impl FilterChain {
    /// Create an empty pipeline that keeps every request unchanged
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip the named headers (case-insensitive) before matching/storage
    #[must_use]
    pub fn strip_headers(mut self, names: Vec<String>) -> Self {
        self.strip_headers = names;
        self
    }

    /// Strip the named query parameters, re-encoding the URI when any were
    /// actually present
    #[must_use]
    pub fn strip_query_parameters(mut self, names: Vec<String>) -> Self {
        self.strip_query_parameters = names;
        self
    }

    /// Strip the named parameters from form-encoded POST bodies
    #[must_use]
    pub fn strip_post_data_parameters(mut self, names: Vec<String>) -> Self {
        self.strip_post_data_parameters = names;
        self
    }

    /// Drop any request whose host is in `hosts` (case-insensitive)
    #[must_use]
    pub fn ignore_hosts(mut self, hosts: Vec<String>) -> Self {
        self.ignore_hosts = hosts.into_iter().map(|h| h.to_lowercase()).collect();
        self
    }

    /// Drop requests aimed at localhost (`localhost`, `127.0.0.1`, `::1`)
    #[must_use]
    pub fn ignore_localhost(mut self, ignore: bool) -> Self {
        self.ignore_localhost = ignore;
        self
    }

    /// Install the final arbitrary callback stage
    #[must_use]
    pub fn before_record(
        mut self,
        callback: impl Fn(Request) -> FilterOutcome + Send + Sync + 'static,
    ) -> Self {
        self.before_record = Some(Arc::new(callback));
        self
    }

    /// Run the pipeline over `request`
    #[must_use]
    pub fn apply(&self, request: &Request) -> FilterOutcome {
        let mut request = request.clone();

        for name in &self.strip_headers {
            request.headers_mut().remove(name);
        }

        if !self.strip_query_parameters.is_empty() {
            strip_query(&mut request, &self.strip_query_parameters);
        }

        if !self.strip_post_data_parameters.is_empty() {
            strip_post_data(&mut request, &self.strip_post_data_parameters);
        }

        if self.is_ignored(&request) {
            debug!(
                "Dropping request to ignored host: {} {}",
                request.method(),
                request.uri()
            );
            return FilterOutcome::Drop;
        }

        match &self.before_record {
            Some(callback) => callback(request),
            None => FilterOutcome::Keep(request),
        }
    }

    fn is_ignored(&self, request: &Request) -> bool {
        let host = request.host().to_lowercase();

        if self.ignore_hosts.contains(&host) {
            return true;
        }

        self.ignore_localhost && matches!(host.as_str(), "localhost" | "127.0.0.1" | "::1" | "[::1]")
    }
}

/// Remove the named query parameters, leaving the URI untouched when none
/// of them were present.
fn strip_query(request: &mut Request, names: &[String]) {
    let pairs = request.query_pairs();
    let retained: Vec<(String, String)> = pairs
        .iter()
        .filter(|(k, _)| !names.contains(k))
        .cloned()
        .collect();

    if retained.len() == pairs.len() {
        return;
    }

    let mut url = request.url().clone();
    let query = encode_pairs(&retained);
    url.set_query(if query.is_empty() {
        None
    } else {
        Some(&query)
    });
    request.set_url(url);
}

/// Remove the named parameters from a form-encoded body. Other body types
/// pass through untouched.
fn strip_post_data(request: &mut Request, names: &[String]) {
    let is_form = media_type(request)
        .is_some_and(|media| media == "application/x-www-form-urlencoded");
    if !is_form {
        return;
    }

    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(request.body())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let retained: Vec<(String, String)> = pairs
        .iter()
        .filter(|(k, _)| !names.contains(k))
        .cloned()
        .collect();

    if retained.len() == pairs.len() {
        return;
    }

    request.set_body(encode_pairs(&retained).into_bytes());
}

fn encode_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HeaderMap;

    fn request(uri: &str) -> Request {
        Request::new("GET", uri, HeaderMap::new(), Vec::new()).unwrap()
    }

    fn keep(outcome: FilterOutcome) -> Request {
        match outcome {
            FilterOutcome::Keep(request) => request,
            FilterOutcome::Drop => panic!("request was dropped"),
        }
    }

    #[test]
    fn test_empty_chain_keeps_request_unchanged() {
        let chain = FilterChain::new();
        let original = request("http://example.com/x?a=1");

        let filtered = keep(chain.apply(&original));
        assert_eq!(filtered, original);
    }

    #[test]
    fn test_strip_headers_case_insensitive() {
        let chain = FilterChain::new().strip_headers(vec!["authorization".into()]);
        let original = Request::new(
            "GET",
            "http://example.com/",
            HeaderMap::from_pairs([("Authorization", "Bearer s3cr3t"), ("Accept", "*/*")]),
            Vec::new(),
        )
        .unwrap();

        let filtered = keep(chain.apply(&original));
        assert!(!filtered.headers().contains("authorization"));
        assert!(filtered.headers().contains("accept"));
    }

    #[test]
    fn test_strip_query_parameters() {
        let chain = FilterChain::new().strip_query_parameters(vec!["foo".into()]);
        let original = request("http://example.com/?foo=bar&q=1");

        let filtered = keep(chain.apply(&original));
        assert_eq!(filtered.uri(), "http://example.com/?q=1");
    }

    #[test]
    fn test_strip_query_leaves_uri_untouched_when_absent() {
        let chain = FilterChain::new().strip_query_parameters(vec!["foo".into()]);
        let original = request("http://example.com/?q=1");

        let filtered = keep(chain.apply(&original));
        assert_eq!(filtered.uri(), original.uri());
    }

    #[test]
    fn test_strip_last_query_parameter_drops_question_mark() {
        let chain = FilterChain::new().strip_query_parameters(vec!["token".into()]);
        let original = request("http://example.com/path?token=abc");

        let filtered = keep(chain.apply(&original));
        assert_eq!(filtered.uri(), "http://example.com/path");
    }

    #[test]
    fn test_strip_post_data_parameters() {
        let chain = FilterChain::new().strip_post_data_parameters(vec!["password".into()]);
        let original = Request::new(
            "POST",
            "http://example.com/login",
            HeaderMap::from_pairs([("Content-Type", "application/x-www-form-urlencoded")]),
            b"user=alice&password=hunter2".to_vec(),
        )
        .unwrap();

        let filtered = keep(chain.apply(&original));
        assert_eq!(filtered.body(), b"user=alice");
    }

    #[test]
    fn test_strip_post_data_ignores_non_form_bodies() {
        let chain = FilterChain::new().strip_post_data_parameters(vec!["password".into()]);
        let original = Request::new(
            "POST",
            "http://example.com/login",
            HeaderMap::from_pairs([("Content-Type", "application/json")]),
            br#"{"password":"hunter2"}"#.to_vec(),
        )
        .unwrap();

        let filtered = keep(chain.apply(&original));
        assert_eq!(filtered.body(), br#"{"password":"hunter2"}"#);
    }

    #[test]
    fn test_ignore_hosts_drops_request() {
        let chain = FilterChain::new().ignore_hosts(vec!["Internal.Example.Com".into()]);

        let ignored = request("http://internal.example.com/status");
        assert!(matches!(chain.apply(&ignored), FilterOutcome::Drop));

        let kept = request("http://public.example.com/status");
        assert!(matches!(chain.apply(&kept), FilterOutcome::Keep(_)));
    }

    #[test]
    fn test_ignore_localhost() {
        let chain = FilterChain::new().ignore_localhost(true);

        for uri in [
            "http://localhost:8000/",
            "http://127.0.0.1/",
            "http://[::1]:9090/health",
        ] {
            assert!(
                matches!(chain.apply(&request(uri)), FilterOutcome::Drop),
                "{uri} should be dropped"
            );
        }

        assert!(matches!(
            chain.apply(&request("http://example.com/")),
            FilterOutcome::Keep(_)
        ));
    }

    #[test]
    fn test_before_record_callback_modifies() {
        let chain = FilterChain::new().before_record(|mut request| {
            request.headers_mut().insert("X-Scrubbed", "yes");
            FilterOutcome::Keep(request)
        });

        let filtered = keep(chain.apply(&request("http://example.com/")));
        assert_eq!(filtered.headers().get("x-scrubbed"), Some("yes"));
    }

    #[test]
    fn test_before_record_callback_drops() {
        let chain = FilterChain::new().before_record(|request| {
            if request.path().starts_with("/admin") {
                FilterOutcome::Drop
            } else {
                FilterOutcome::Keep(request)
            }
        });

        assert!(matches!(
            chain.apply(&request("http://example.com/admin/users")),
            FilterOutcome::Drop
        ));
        assert!(matches!(
            chain.apply(&request("http://example.com/public")),
            FilterOutcome::Keep(_)
        ));
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        let chain = FilterChain::new()
            .strip_headers(vec!["authorization".into()])
            .strip_query_parameters(vec!["key".into()]);
        let original = Request::new(
            "GET",
            "http://example.com/?key=s3cr3t&q=1",
            HeaderMap::from_pairs([("Authorization", "token")]),
            Vec::new(),
        )
        .unwrap();

        let once = keep(chain.apply(&original));
        let twice = keep(chain.apply(&once));
        assert_eq!(once, twice);
    }
}
