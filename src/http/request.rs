//! Captured HTTP request

use url::Url;

use crate::{ReelError, Result};

use super::HeaderMap;

/// An outgoing HTTP request as seen by the matching engine.
///
/// The URI must be absolute; scheme, host, port, path and query are derived
/// from it on demand. Matching is structural: two requests built from the
/// same parts always compare equal.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: String,
    url: Url,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Request {
    /// Build a request from method, absolute URI, headers and body
    ///
    /// # Errors
    ///
    /// Returns `ReelError::Format` if the URI is not an absolute parsable URL
    pub fn new(
        method: impl Into<String>,
        uri: &str,
        headers: HeaderMap,
        body: Vec<u8>,
    ) -> Result<Self> {
        let url = Url::parse(uri)
            .map_err(|e| ReelError::Format(format!("invalid request URI '{uri}': {e}")))?;

        Ok(Self {
            method: method.into(),
            url,
            headers,
            body,
        })
    }

    /// HTTP method
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Full URI as a string
    #[must_use]
    pub fn uri(&self) -> &str {
        self.url.as_str()
    }

    /// Parsed URL
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// URI scheme (e.g. "https")
    #[must_use]
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Host component, empty for hostless URIs
    #[must_use]
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Port, explicit or the protocol default (80 for http, 443 for https)
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.url.port_or_known_default()
    }

    /// URI path component
    #[must_use]
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Percent-decoded query pairs in URI order, duplicates preserved
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Query pairs sorted by key then value, for stable comparison
    #[must_use]
    pub fn sorted_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = self.query_pairs();
        pairs.sort_unstable();
        pairs
    }

    /// Request headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the headers (used by redaction filters)
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Request body bytes
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Replace the body (used by redaction filters)
    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    /// Replace the URI
    ///
    /// # Errors
    ///
    /// Returns `ReelError::Format` if the new URI is not parsable
    pub fn set_uri(&mut self, uri: &str) -> Result<()> {
        self.url = Url::parse(uri)
            .map_err(|e| ReelError::Format(format!("invalid request URI '{uri}': {e}")))?;
        Ok(())
    }

    pub(crate) fn set_url(&mut self, url: Url) {
        self.url = url;
    }

    /// Content-Type header value, looked up case-insensitively
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> Request {
        Request::new("GET", uri, HeaderMap::new(), Vec::new()).unwrap()
    }

    #[test]
    fn test_derived_fields() {
        let req = request("https://api.example.com/v1/users?b=2&a=1");

        assert_eq!(req.scheme(), "https");
        assert_eq!(req.host(), "api.example.com");
        assert_eq!(req.port(), Some(443));
        assert_eq!(req.path(), "/v1/users");
        assert_eq!(
            req.query_pairs(),
            vec![("b".into(), "2".into()), ("a".into(), "1".into())]
        );
        assert_eq!(
            req.sorted_query_pairs(),
            vec![("a".into(), "1".into()), ("b".into(), "2".into())]
        );
    }

    #[test]
    fn test_default_port_by_scheme() {
        assert_eq!(request("http://example.com/").port(), Some(80));
        assert_eq!(request("https://example.com/").port(), Some(443));
        assert_eq!(request("http://example.com:8080/").port(), Some(8080));
    }

    #[test]
    fn test_query_decoding() {
        let req = request("http://example.com/?q=hello%20world&tag=a%2Bb");

        assert_eq!(
            req.query_pairs(),
            vec![
                ("q".into(), "hello world".into()),
                ("tag".into(), "a+b".into())
            ]
        );
    }

    #[test]
    fn test_relative_uri_rejected() {
        let result = Request::new("GET", "/just/a/path", HeaderMap::new(), Vec::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_structural_equality() {
        let a = request("http://example.com/x?k=v");
        let b = request("http://example.com/x?k=v");
        assert_eq!(a, b);
    }
}
