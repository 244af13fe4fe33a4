//! On-disk document schema and conversions to the in-memory model
//!
//! The serialized form is always the versioned wrapper
//! `{version, interactions}`. Request headers persist as a mapping of
//! lowercased name to the list of original-case `(name, value)` pairs;
//! response headers as name to list of values. Bodies persist as UTF-8
//! text under `string`, or hex under `hex` when the bytes are not valid
//! UTF-8.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cassette::Interaction;
use crate::http::{HeaderMap, Request, Response};
use crate::{ReelError, Result};

use super::FORMAT_VERSION;

/// Root of the versioned cassette file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CassetteDocument {
    /// Format version, currently 1
    pub version: u32,
    /// Interactions in record order
    pub interactions: Vec<InteractionRecord>,
}

impl CassetteDocument {
    /// Build a document from in-memory interactions, preserving order
    #[must_use]
    pub fn from_interactions(interactions: &[Interaction]) -> Self {
        Self {
            version: FORMAT_VERSION,
            interactions: interactions
                .iter()
                .map(InteractionRecord::from_interaction)
                .collect(),
        }
    }

    /// Convert back into in-memory interactions, order preserved and
    /// played counters reset
    pub fn into_interactions(self) -> Result<Vec<Interaction>> {
        self.interactions
            .into_iter()
            .map(InteractionRecord::into_interaction)
            .collect()
    }
}

/// One captured request/response pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionRecord {
    /// The stored request
    pub request: RequestRecord,
    /// The stored response
    pub response: ResponseRecord,
}

impl InteractionRecord {
    /// Build a record from an in-memory interaction
    #[must_use]
    pub fn from_interaction(interaction: &Interaction) -> Self {
        Self {
            request: RequestRecord::from_request(&interaction.request),
            response: ResponseRecord::from_response(&interaction.response),
        }
    }

    /// Convert back into an in-memory interaction
    pub fn into_interaction(self) -> Result<Interaction> {
        Ok(Interaction::new(
            self.request.into_request()?,
            self.response.into_response()?,
        ))
    }
}

/// Serialized request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestRecord {
    /// HTTP method
    pub method: String,
    /// Absolute URI
    pub uri: String,
    /// Request body
    pub body: BodyRecord,
    /// Lowercased name to original-case `(name, value)` pairs
    pub headers: BTreeMap<String, Vec<(String, String)>>,
}

impl RequestRecord {
    /// Build a record from an in-memory request
    #[must_use]
    pub fn from_request(request: &Request) -> Self {
        let mut headers: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
        for (name, value) in request.headers().iter() {
            headers
                .entry(name.to_lowercase())
                .or_default()
                .push((name.to_string(), value.to_string()));
        }

        Self {
            method: request.method().to_string(),
            uri: request.uri().to_string(),
            body: BodyRecord::from_bytes(request.body()),
            headers,
        }
    }

    /// Convert back into an in-memory request
    pub fn into_request(self) -> Result<Request> {
        let mut headers = HeaderMap::new();
        for (_, pairs) in self.headers {
            for (name, value) in pairs {
                headers.append(name, value);
            }
        }

        let body = self.body.to_bytes("request")?;
        Request::new(self.method, &self.uri, headers, body)
    }
}

/// Serialized response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseRecord {
    /// Status line
    pub status: StatusRecord,
    /// Header name to list of values
    pub headers: BTreeMap<String, Vec<String>>,
    /// Response body
    pub body: BodyRecord,
}

impl ResponseRecord {
    /// Build a record from an in-memory response
    #[must_use]
    pub fn from_response(response: &Response) -> Self {
        let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in response.headers.iter() {
            let key = response
                .headers
                .canonical_name(name)
                .unwrap_or(name)
                .to_string();
            headers.entry(key).or_default().push(value.to_string());
        }

        Self {
            status: StatusRecord {
                code: response.status,
                message: response.reason.clone(),
            },
            headers,
            body: BodyRecord::from_bytes(&response.body),
        }
    }

    fn into_response(self) -> Result<Response> {
        let mut headers = HeaderMap::new();
        for (name, values) in self.headers {
            for value in values {
                headers.append(name.clone(), value);
            }
        }

        Ok(Response::new(
            self.status.code,
            self.status.message,
            headers,
            self.body.to_bytes("response")?,
        ))
    }
}

/// Status code plus reason phrase
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusRecord {
    /// Numeric status code
    pub code: u16,
    /// Reason phrase
    pub message: String,
}

/// Serialized body: UTF-8 text under `string`, hex bytes under `hex`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BodyRecord {
    /// Body as UTF-8 text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string: Option<String>,
    /// Body as hex-encoded bytes, for non-UTF-8 payloads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
}

impl BodyRecord {
    /// Encode raw bytes, preferring the readable `string` form
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self {
                string: Some(text.to_string()),
                hex: None,
            },
            Err(_) => Self {
                string: None,
                hex: Some(hex::encode(bytes)),
            },
        }
    }

    /// Decode back into raw bytes
    ///
    /// # Errors
    ///
    /// Returns `ReelError::UnsupportedBody` when the record carries both
    /// encodings or undecodable hex
    pub fn to_bytes(&self, context: &str) -> Result<Vec<u8>> {
        match (&self.string, &self.hex) {
            (Some(_), Some(_)) => Err(ReelError::UnsupportedBody(format!(
                "{context} body carries both 'string' and 'hex' encodings"
            ))),
            (Some(text), None) => Ok(text.clone().into_bytes()),
            (None, Some(encoded)) => hex::decode(encoded).map_err(|e| {
                ReelError::UnsupportedBody(format!("{context} body is not valid hex: {e}"))
            }),
            (None, None) => Ok(Vec::new()),
        }
    }
}
