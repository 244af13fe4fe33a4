//! Textual serializers for the versioned cassette schema

use crate::{ReelError, Result};

use super::document::CassetteDocument;
use super::validate_version;

/// Converts between the document schema and one textual encoding.
///
/// Both built-in serializers round-trip the same logical schema; only the
/// surface syntax differs.
pub trait Serializer: Send + Sync {
    /// Registered name of this serializer
    fn name(&self) -> &'static str;

    /// Encode a document to text
    ///
    /// # Errors
    ///
    /// Returns `ReelError::Format` if the document cannot be encoded
    fn serialize(&self, document: &CassetteDocument) -> Result<String>;

    /// Decode a document from text
    ///
    /// # Errors
    ///
    /// Returns `ReelError::Format` for unparsable text, an unsupported
    /// version, or a pre-versioning legacy file (a bare interaction list)
    fn deserialize(&self, text: &str) -> Result<CassetteDocument>;
}

/// Message for bare-list files: they are never accepted, only migrated
const LEGACY_HINT: &str = "cassette is a bare interaction list without a version wrapper \
     (pre-versioning format); run reel::migration::migrate_file on it first";

/// Indented structured-text serializer (YAML)
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlSerializer;

impl Serializer for YamlSerializer {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn serialize(&self, document: &CassetteDocument) -> Result<String> {
        serde_yaml::to_string(document)
            .map_err(|e| ReelError::Format(format!("cannot encode cassette as YAML: {e}")))
    }

    fn deserialize(&self, text: &str) -> Result<CassetteDocument> {
        let value: serde_yaml::Value = serde_yaml::from_str(text)
            .map_err(|e| ReelError::Format(format!("unparsable YAML cassette: {e}")))?;

        if value.is_sequence() {
            return Err(ReelError::Format(LEGACY_HINT.to_string()));
        }

        let document: CassetteDocument = serde_yaml::from_value(value)
            .map_err(|e| ReelError::Format(format!("malformed YAML cassette: {e}")))?;
        validate_version(document.version)?;
        Ok(document)
    }
}

/// Structured-text serializer (pretty-printed JSON)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn serialize(&self, document: &CassetteDocument) -> Result<String> {
        serde_json::to_string_pretty(document)
            .map_err(|e| ReelError::Format(format!("cannot encode cassette as JSON: {e}")))
    }

    fn deserialize(&self, text: &str) -> Result<CassetteDocument> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| ReelError::Format(format!("unparsable JSON cassette: {e}")))?;

        if value.is_array() {
            return Err(ReelError::Format(LEGACY_HINT.to_string()));
        }

        let document: CassetteDocument = serde_json::from_value(value)
            .map_err(|e| ReelError::Format(format!("malformed JSON cassette: {e}")))?;
        validate_version(document.version)?;
        Ok(document)
    }
}
