//! Storage strategies for cassette documents

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use dashmap::DashMap;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::fingerprint::fingerprint_parts;
use crate::{ReelError, Result};

use super::document::{CassetteDocument, RequestRecord};
use super::serializer::Serializer;

/// How many preceding interactions the deduplicating persister scans
const DEDUP_WINDOW: usize = 3;

/// Moves cassette documents to and from disk.
///
/// Persisters and serializers are independent axes: a persister decides the
/// storage strategy, the serializer it is handed decides the encoding.
pub trait Persister: Send + Sync {
    /// Registered name of this persister
    fn name(&self) -> &'static str;

    /// Load the document at `path`, or `None` if no file exists there
    ///
    /// # Errors
    ///
    /// Returns `ReelError::Io` for unreadable files and `ReelError::Format`
    /// for undecodable content
    fn load(&self, path: &Path, serializer: &dyn Serializer) -> Result<Option<CassetteDocument>>;

    /// Write the document to `path`
    ///
    /// # Errors
    ///
    /// Returns `ReelError::Io` if the file cannot be written
    fn save(
        &self,
        path: &Path,
        document: &CassetteDocument,
        serializer: &dyn Serializer,
    ) -> Result<()>;
}

/// Write `text` to `path` atomically: a temporary file in the same
/// directory, then a rename over the target. A reader never observes a
/// partially written cassette.
pub(crate) fn write_atomic(path: &Path, text: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(text.as_bytes())?;
    tmp.persist(path).map_err(|e| ReelError::Io(e.error))?;
    Ok(())
}

/// Plain filesystem persister
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemPersister;

impl Persister for FilesystemPersister {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn load(&self, path: &Path, serializer: &dyn Serializer) -> Result<Option<CassetteDocument>> {
        match fs::read_to_string(path) {
            Ok(text) => serializer.deserialize(&text).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(
        &self,
        path: &Path,
        document: &CassetteDocument,
        serializer: &dyn Serializer,
    ) -> Result<()> {
        write_atomic(path, &serializer.serialize(document)?)
    }
}

/// Filesystem persister that drops near-window duplicates before writing.
///
/// Immediately before writing, any interaction whose request attribute set
/// exactly duplicates one of the following up-to-[`DEDUP_WINDOW`]
/// interactions is dropped; the chronologically later duplicate wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct DedupingPersister;

impl Persister for DedupingPersister {
    fn name(&self) -> &'static str {
        "dedup"
    }

    fn load(&self, path: &Path, serializer: &dyn Serializer) -> Result<Option<CassetteDocument>> {
        FilesystemPersister.load(path, serializer)
    }

    fn save(
        &self,
        path: &Path,
        document: &CassetteDocument,
        serializer: &dyn Serializer,
    ) -> Result<()> {
        let deduped = dedup_interactions(document);
        FilesystemPersister.save(path, &deduped, serializer)
    }
}

fn record_fingerprint(record: &RequestRecord) -> [u8; 32] {
    let headers: Vec<(String, String)> = record
        .headers
        .iter()
        .flat_map(|(folded, pairs)| {
            pairs
                .iter()
                .map(move |(_, value)| (folded.clone(), value.clone()))
        })
        .collect();
    let body = record.body.to_bytes("request").unwrap_or_default();

    fingerprint_parts(&record.method, &record.uri, &headers, &body)
}

fn dedup_interactions(document: &CassetteDocument) -> CassetteDocument {
    let prints: Vec<[u8; 32]> = document
        .interactions
        .iter()
        .map(|interaction| record_fingerprint(&interaction.request))
        .collect();

    let mut dropped = vec![false; prints.len()];
    for later in 0..prints.len() {
        for earlier in later.saturating_sub(DEDUP_WINDOW)..later {
            if !dropped[earlier] && prints[earlier] == prints[later] {
                dropped[earlier] = true;
                debug!(
                    "Dropping duplicate interaction {} (kept later duplicate {}): {}",
                    earlier,
                    later,
                    hex::encode(&prints[later][..8])
                );
            }
        }
    }

    CassetteDocument {
        version: document.version,
        interactions: document
            .interactions
            .iter()
            .zip(&dropped)
            .filter(|(_, dropped)| !**dropped)
            .map(|(interaction, _)| interaction.clone())
            .collect(),
    }
}

/// Filesystem persister that memoizes loads and elides redundant saves.
///
/// Loads are keyed by path and on-disk modification time; an unchanged file
/// skips re-deserialization. Saves are skipped when the in-memory
/// interaction count for that path did not grow since the last load or
/// save.
#[derive(Debug, Default)]
pub struct CachingPersister {
    documents: DashMap<PathBuf, (SystemTime, CassetteDocument)>,
    known_counts: DashMap<PathBuf, usize>,
}

impl CachingPersister {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of memoized documents
    #[must_use]
    pub fn cached_documents(&self) -> usize {
        self.documents.len()
    }
}

impl Persister for CachingPersister {
    fn name(&self) -> &'static str {
        "cached"
    }

    fn load(&self, path: &Path, serializer: &dyn Serializer) -> Result<Option<CassetteDocument>> {
        let mtime = fs::metadata(path).and_then(|m| m.modified()).ok();

        if let (Some(mtime), Some(entry)) = (mtime, self.documents.get(path)) {
            let (cached_mtime, document) = entry.value();
            if *cached_mtime == mtime {
                debug!("Cassette cache hit: {}", path.display());
                return Ok(Some(document.clone()));
            }
        }

        let document = FilesystemPersister.load(path, serializer)?;
        if let (Some(mtime), Some(document)) = (mtime, &document) {
            self.documents
                .insert(path.to_path_buf(), (mtime, document.clone()));
            self.known_counts
                .insert(path.to_path_buf(), document.interactions.len());
        }
        Ok(document)
    }

    fn save(
        &self,
        path: &Path,
        document: &CassetteDocument,
        serializer: &dyn Serializer,
    ) -> Result<()> {
        let count = document.interactions.len();
        let unchanged = self
            .known_counts
            .get(path)
            .is_some_and(|known| count <= *known);
        if unchanged {
            debug!(
                "Skipping save of {}: interaction count did not grow",
                path.display()
            );
            return Ok(());
        }

        FilesystemPersister.save(path, document, serializer)?;
        self.known_counts.insert(path.to_path_buf(), count);
        // The rename changed the mtime; drop the stale load entry.
        self.documents.remove(path);
        Ok(())
    }
}
