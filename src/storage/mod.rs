//! Versioned textual storage for cassettes
//!
//! Two independent axes: a [`Serializer`] turns the document schema into
//! text (YAML or JSON, one logical schema), and a [`Persister`] decides how
//! documents reach disk (plain, deduplicating, caching). A cassette
//! references one of each; both are swappable via registration on the
//! configuration facade.

mod document;
mod persister;
mod serializer;

pub use document::{
    BodyRecord, CassetteDocument, InteractionRecord, RequestRecord, ResponseRecord, StatusRecord,
};
pub use persister::{CachingPersister, DedupingPersister, FilesystemPersister, Persister};
pub(crate) use persister::write_atomic;
pub use serializer::{JsonSerializer, Serializer, YamlSerializer};

use crate::Result;

/// Current on-disk format version
pub const FORMAT_VERSION: u32 = 1;

/// Validate a document's version field
///
/// # Errors
///
/// Returns `ReelError::Format` for any version other than [`FORMAT_VERSION`]
pub fn validate_version(version: u32) -> Result<()> {
    if version != FORMAT_VERSION {
        return Err(crate::ReelError::Format(format!(
            "unsupported cassette version {version}, expected {FORMAT_VERSION}"
        )));
    }
    Ok(())
}
