//! The cassette state machine

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::filters::{FilterChain, FilterOutcome};
use crate::http::{Request, Response};
use crate::matching::{MatchSet, MatcherRegistry, DEFAULT_MATCH_ON};
use crate::storage::{CassetteDocument, FilesystemPersister, Persister, Serializer, YamlSerializer};
use crate::{ReelError, Result};

use super::mode::RecordMode;
use super::Interaction;

/// Everything a cassette needs besides its path.
///
/// Defaults: `once` record mode, the default matcher set, no filters, YAML
/// serializer, plain filesystem persister.
#[derive(Clone)]
pub struct CassetteOptions {
    /// Record-mode policy for this session
    pub record_mode: RecordMode,
    /// Ordered matcher set requests are compared under
    pub match_set: MatchSet,
    /// Filter pipeline for live requests
    pub filters: FilterChain,
    /// Textual encoding
    pub serializer: Arc<dyn Serializer>,
    /// Storage strategy
    pub persister: Arc<dyn Persister>,
}

impl Default for CassetteOptions {
    fn default() -> Self {
        Self {
            record_mode: RecordMode::default(),
            match_set: MatchSet::from_names(DEFAULT_MATCH_ON, &MatcherRegistry::with_builtins())
                .expect("built-in matchers are always registered"),
            filters: FilterChain::new(),
            serializer: Arc::new(YamlSerializer),
            persister: Arc::new(FilesystemPersister),
        }
    }
}

/// The persisted, replayable record of one test's HTTP interactions.
///
/// A cassette is for one logical sequential flow: consuming operations take
/// `&mut self`, so sharing one cassette between concurrent requests needs
/// an external lock around the check-then-consume sequence.
///
/// Lifecycle: [`Cassette::load`], zero or more exchanges, then
/// [`Cassette::eject`] (or drop, which saves best-effort) persisting the
/// session if it is dirty and the record mode permits writing.
pub struct Cassette {
    path: PathBuf,
    record_mode: RecordMode,
    match_set: MatchSet,
    filters: FilterChain,
    serializer: Arc<dyn Serializer>,
    persister: Arc<dyn Persister>,
    interactions: Vec<Interaction>,
    existed_on_load: bool,
    dirty: bool,
    play_count: u64,
}

impl std::fmt::Debug for Cassette {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cassette")
            .field("path", &self.path)
            .field("record_mode", &self.record_mode)
            .field("interactions", &self.interactions)
            .field("existed_on_load", &self.existed_on_load)
            .field("dirty", &self.dirty)
            .field("play_count", &self.play_count)
            .finish_non_exhaustive()
    }
}

impl Cassette {
    /// Load the cassette at `path`, or initialize an empty one if no file
    /// exists there
    ///
    /// # Errors
    ///
    /// Returns `ReelError::Format` if the file exists but is unparsable or
    /// an unmigrated legacy cassette. A cassette that fails to load exposes
    /// no partial state.
    pub fn load(path: impl Into<PathBuf>, options: CassetteOptions) -> Result<Self> {
        let path = path.into();
        let document = options.persister.load(&path, options.serializer.as_ref())?;
        let existed_on_load = document.is_some();
        let interactions = match document {
            Some(document) => document.into_interactions()?,
            None => Vec::new(),
        };

        info!(
            "Loaded cassette {}: {} interactions (mode: {})",
            path.display(),
            interactions.len(),
            options.record_mode
        );

        Ok(Self {
            path,
            record_mode: options.record_mode,
            match_set: options.match_set,
            filters: options.filters,
            serializer: options.serializer,
            persister: options.persister,
            interactions,
            existed_on_load,
            dirty: false,
            play_count: 0,
        })
    }

    /// Path identifying this cassette
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Active record mode
    #[must_use]
    pub fn record_mode(&self) -> RecordMode {
        self.record_mode
    }

    /// Number of interactions currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// Whether the cassette holds no interactions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Number of interactions served from this cassette this session
    #[must_use]
    pub fn play_count(&self) -> u64 {
        self.play_count
    }

    /// Whether unsaved interactions exist
    #[must_use]
    pub fn dirty(&self) -> bool {
        self.dirty
    }

    /// Whether every interaction has been served at least once
    #[must_use]
    pub fn all_played(&self) -> bool {
        self.interactions.iter().all(|i| i.played() > 0)
    }

    /// Per-interaction played counters, in record order
    #[must_use]
    pub fn play_counts(&self) -> Vec<u64> {
        self.interactions.iter().map(Interaction::played).collect()
    }

    /// Run the filter pipeline over `request`, so callers can pre-screen
    /// before deciding to go live
    #[must_use]
    pub fn filter_request(&self, request: &Request) -> FilterOutcome {
        self.filters.apply(request)
    }

    /// Whether the active record mode forbids adding any new interaction
    /// at this point in the session
    #[must_use]
    pub fn write_protected(&self) -> bool {
        !self.record_mode.allows_recording(self.existed_on_load)
    }

    /// Whether a stored, not-yet-consumed interaction matches `request`
    /// after filtering, and the record mode permits replay
    #[must_use]
    pub fn can_play_response_for(&self, request: &Request) -> bool {
        if !self.record_mode.allows_playback() {
            return false;
        }

        match self.filters.apply(request) {
            FilterOutcome::Drop => false,
            FilterOutcome::Keep(filtered) => self.find_unplayed(&filtered).is_some(),
        }
    }

    /// Consume the earliest unplayed interaction matching `request` and
    /// return its response
    ///
    /// # Errors
    ///
    /// Returns `ReelError::Playback` when called without a prior successful
    /// [`Cassette::can_play_response_for`]; callers must check first
    pub fn play_response(&mut self, request: &Request) -> Result<Response> {
        if !self.record_mode.allows_playback() {
            return Err(ReelError::Playback(format!(
                "record mode '{}' never replays; check can_play_response_for first",
                self.record_mode
            )));
        }

        let filtered = match self.filters.apply(request) {
            FilterOutcome::Drop => {
                return Err(ReelError::Playback(format!(
                    "request {} {} is excluded by filters; check can_play_response_for first",
                    request.method(),
                    request.uri()
                )));
            }
            FilterOutcome::Keep(filtered) => filtered,
        };

        let Some(index) = self.find_unplayed(&filtered) else {
            self.log_mismatches(&filtered);
            return Err(ReelError::Playback(format!(
                "no unplayed interaction matches {} {}; check can_play_response_for first",
                filtered.method(),
                filtered.uri()
            )));
        };

        self.interactions[index].mark_played();
        self.play_count += 1;

        debug!(
            "Replayed interaction {}: {} {} -> {} (play count: {})",
            index,
            filtered.method(),
            filtered.uri(),
            self.interactions[index].response.status,
            self.play_count
        );

        Ok(self.interactions[index].response.clone())
    }

    /// Filter `request` and append it with `response` as a new interaction.
    ///
    /// A request the filters drop is silently discarded: no side effect, no
    /// error.
    ///
    /// # Errors
    ///
    /// Returns `ReelError::CannotOverwrite` when the cassette is
    /// write-protected, identifying the offending request, the cassette
    /// path and the active mode
    pub fn append(&mut self, request: &Request, response: Response) -> Result<()> {
        let filtered = match self.filters.apply(request) {
            FilterOutcome::Drop => {
                debug!(
                    "Not recording filtered-out request: {} {}",
                    request.method(),
                    request.uri()
                );
                return Ok(());
            }
            FilterOutcome::Keep(filtered) => filtered,
        };

        if self.write_protected() {
            return Err(ReelError::CannotOverwrite {
                method: filtered.method().to_string(),
                uri: filtered.uri().to_string(),
                path: self.path.clone(),
                mode: self.record_mode.to_string(),
            });
        }

        debug!(
            "Recorded interaction: {} {} -> {}",
            filtered.method(),
            filtered.uri(),
            response.status
        );

        self.interactions.push(Interaction::new(filtered, response));
        self.dirty = true;
        Ok(())
    }

    /// Persist the cassette if it is dirty and the record mode permits
    /// writing. Strictly a no-op otherwise: an unchanged cassette never
    /// touches its file.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if self.write_protected() {
            debug!(
                "Not saving write-protected cassette {} (mode: {})",
                self.path.display(),
                self.record_mode
            );
            return Ok(());
        }

        let document = CassetteDocument::from_interactions(&self.interactions);
        self.persister
            .save(&self.path, &document, self.serializer.as_ref())?;
        self.dirty = false;

        info!(
            "Saved cassette {}: {} interactions",
            self.path.display(),
            self.interactions.len()
        );
        Ok(())
    }

    /// Explicitly end the session, surfacing any save error.
    ///
    /// Dropping the cassette saves too, but can only log failures.
    pub fn eject(mut self) -> Result<()> {
        self.save()
    }

    fn find_unplayed(&self, filtered: &Request) -> Option<usize> {
        self.interactions
            .iter()
            .position(|i| i.played() == 0 && self.match_set.matches(filtered, &i.request))
    }

    fn log_mismatches(&self, filtered: &Request) {
        for (index, interaction) in self.interactions.iter().enumerate() {
            if interaction.played() > 0 {
                continue;
            }
            let disagreeing = self.match_set.mismatches(filtered, &interaction.request);
            debug!(
                "Interaction {} disagrees on: {}",
                index,
                disagreeing.join(", ")
            );
        }
    }
}

impl Drop for Cassette {
    /// An interrupted session still attempts to persist its recordings.
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.save() {
                warn!(
                    "Failed to save cassette {} on drop: {e}",
                    self.path.display()
                );
            }
        }
    }
}
