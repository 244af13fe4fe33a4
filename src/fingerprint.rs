//! Request fingerprinting for deterministic hash generation
//!
//! Fingerprints cover the full request attribute set (method, URI, headers,
//! body). They back the deduplicating persister's equality checks and give
//! log lines a short stable identifier. Matching itself never uses them —
//! matchers compare requests structurally.

use sha2::{Digest, Sha256};

use crate::http::Request;

/// Compute a SHA-256 fingerprint from canonical request parts.
///
/// Header names are expected pre-lowercased; pairs are sorted here so the
/// fingerprint is independent of header order. Every field is
/// length-prefixed to keep the encoding unambiguous.
#[must_use]
pub fn fingerprint_parts(
    method: &str,
    uri: &str,
    headers: &[(String, String)],
    body: &[u8],
) -> [u8; 32] {
    let mut hasher = Sha256::new();

    let method = method.to_uppercase();
    hasher.update((method.len() as u32).to_le_bytes());
    hasher.update(method.as_bytes());

    hasher.update((uri.len() as u32).to_le_bytes());
    hasher.update(uri.as_bytes());

    let mut headers = headers.to_vec();
    headers.sort();
    for (name, value) in &headers {
        hasher.update((name.len() as u32).to_le_bytes());
        hasher.update(name.as_bytes());
        hasher.update((value.len() as u32).to_le_bytes());
        hasher.update(value.as_bytes());
    }

    hasher.update((body.len() as u32).to_le_bytes());
    hasher.update(body);

    hasher.finalize().into()
}

/// Compute the SHA-256 fingerprint of a request
#[must_use]
pub fn fingerprint_request(request: &Request) -> [u8; 32] {
    let headers: Vec<(String, String)> = request
        .headers()
        .iter()
        .map(|(n, v)| (n.to_lowercase(), v.trim().to_string()))
        .collect();

    fingerprint_parts(request.method(), request.uri(), &headers, request.body())
}
