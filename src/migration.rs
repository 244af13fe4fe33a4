//! One-way migration of pre-versioning cassette files
//!
//! Pre-versioning cassettes store requests as four discrete fields
//! (`protocol`, `host`, `port`, `path`) instead of a single URI, carry
//! single-valued headers, and have no `{version, interactions}` wrapper.
//! Migration reconstructs the URI (eliding protocol-default ports), widens
//! headers to multi-valued lists, and re-serializes under the current
//! versioned schema. Files that are already current-format or unrecognized
//! are left byte-for-byte unchanged.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::storage::{
    write_atomic, BodyRecord, CassetteDocument, InteractionRecord, JsonSerializer, RequestRecord,
    ResponseRecord, Serializer, StatusRecord, YamlSerializer, FORMAT_VERSION,
};
use crate::Result;

/// A single interaction in the pre-versioning format
#[derive(Debug, Deserialize)]
struct LegacyInteraction {
    request: LegacyRequest,
    response: LegacyResponse,
}

#[derive(Debug, Deserialize)]
struct LegacyRequest {
    method: String,
    protocol: String,
    host: String,
    #[serde(default)]
    port: Option<u16>,
    path: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct LegacyResponse {
    status: StatusRecord,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    body: BodyRecord,
}

impl LegacyRequest {
    /// Rebuild the absolute URI, omitting protocol-default ports
    /// (80 for http, 443 for https)
    fn uri(&self) -> String {
        let default_port = match self.protocol.as_str() {
            "http" => Some(80),
            "https" => Some(443),
            _ => None,
        };

        match self.port {
            Some(port) if Some(port) != default_port => {
                format!("{}://{}:{}{}", self.protocol, self.host, port, self.path)
            }
            _ => format!("{}://{}{}", self.protocol, self.host, self.path),
        }
    }

    fn into_record(self) -> RequestRecord {
        let uri = self.uri();
        let mut headers: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
        for (name, value) in self.headers {
            headers
                .entry(name.to_lowercase())
                .or_default()
                .push((name, value));
        }

        RequestRecord {
            method: self.method,
            uri,
            body: BodyRecord {
                string: self.body,
                hex: None,
            },
            headers,
        }
    }
}

impl LegacyResponse {
    fn into_record(self) -> ResponseRecord {
        ResponseRecord {
            status: self.status,
            headers: self
                .headers
                .into_iter()
                .map(|(name, value)| (name, vec![value]))
                .collect(),
            body: self.body,
        }
    }
}

/// Attempt to migrate one file in place, returning whether it was changed.
///
/// Files with a `.json` extension parse as JSON, everything else as YAML.
/// Current-format and unrecognized files report `false` and are not
/// touched.
///
/// # Errors
///
/// Returns `ReelError::Io` if the file cannot be read or rewritten
pub fn migrate_file(path: &Path) -> Result<bool> {
    let text = fs::read_to_string(path)?;
    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");

    let Some(legacy) = parse_legacy(&text, is_json) else {
        return Ok(false);
    };

    let document = CassetteDocument {
        version: FORMAT_VERSION,
        interactions: legacy
            .into_iter()
            .map(|interaction| InteractionRecord {
                request: interaction.request.into_record(),
                response: interaction.response.into_record(),
            })
            .collect(),
    };

    let migrated = if is_json {
        JsonSerializer.serialize(&document)?
    } else {
        YamlSerializer.serialize(&document)?
    };
    write_atomic(path, &migrated)?;

    info!(
        "Migrated legacy cassette {}: {} interactions",
        path.display(),
        document.interactions.len()
    );
    Ok(true)
}

/// Parse `text` as a legacy bare interaction list, or `None` when it is
/// anything else (current format, unrecognized, unparsable)
fn parse_legacy(text: &str, is_json: bool) -> Option<Vec<LegacyInteraction>> {
    if is_json {
        let value: serde_json::Value = serde_json::from_str(text).ok()?;
        if !value.is_array() {
            return None;
        }
        serde_json::from_value(value).ok()
    } else {
        let value: serde_yaml::Value = serde_yaml::from_str(text).ok()?;
        if !value.is_sequence() {
            return None;
        }
        serde_yaml::from_value(value).ok()
    }
}

/// Walk a directory tree file-by-file, migrating every legacy cassette.
///
/// Unreadable entries are logged and skipped. Returns the paths that were
/// actually changed.
///
/// # Errors
///
/// Returns `ReelError::Io` if the directory itself cannot be read
pub fn migrate_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut migrated = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            migrated.extend(migrate_dir(&path)?);
            continue;
        }

        match migrate_file(&path) {
            Ok(true) => migrated.push(path),
            Ok(false) => {}
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }

    Ok(migrated)
}
