//! Captured HTTP response

use super::HeaderMap;

/// A recorded HTTP response.
///
/// Responses are opaque to the matching engine: they are only ever returned
/// to the caller, never matched against. Replay is application-level —
/// status, headers and body — with no transport framing.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Status code
    pub status: u16,
    /// Reason phrase (e.g. "OK")
    pub reason: String,
    /// Response headers; repeated names keep every value
    pub headers: HeaderMap,
    /// Raw body bytes
    pub body: Vec<u8>,
}

impl Response {
    /// Build a response from its parts
    #[must_use]
    pub fn new(
        status: u16,
        reason: impl Into<String>,
        headers: HeaderMap,
        body: Vec<u8>,
    ) -> Self {
        Self {
            status,
            reason: reason.into(),
            headers,
            body,
        }
    }
}
