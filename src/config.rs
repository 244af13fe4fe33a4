//! Configuration facade
//!
//! A [`Recorder`] resolves default options, registers custom matchers,
//! serializers and persisters, and produces a configured
//! [`Cassette`](crate::cassette::Cassette) for a given path. The
//! declarative subset of the configuration can also be loaded from a TOML
//! file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::cassette::{Cassette, CassetteOptions, RecordMode};
use crate::filters::{FilterChain, FilterOutcome};
use crate::http::Request;
use crate::matching::{MatchSet, MatcherRegistry, DEFAULT_MATCH_ON};
use crate::storage::{
    CachingPersister, DedupingPersister, FilesystemPersister, JsonSerializer, Persister,
    Serializer, YamlSerializer,
};
use crate::{ReelError, Result};

/// Builds cassettes from resolved defaults and registered extensions
pub struct Recorder {
    record_mode: RecordMode,
    match_on: Vec<String>,
    serializer: String,
    persister: String,
    cassette_library_dir: Option<PathBuf>,
    filter_headers: Vec<String>,
    filter_query_parameters: Vec<String>,
    filter_post_data_parameters: Vec<String>,
    ignore_hosts: Vec<String>,
    ignore_localhost: bool,
    before_record: Option<Arc<dyn Fn(Request) -> FilterOutcome + Send + Sync>>,
    matchers: MatcherRegistry,
    serializers: HashMap<String, Arc<dyn Serializer>>,
    persisters: HashMap<String, Arc<dyn Persister>>,
}

impl Recorder {
    /// Create a recorder with default options: `once` record mode, the
    /// default matcher set, YAML serializer, filesystem persister, no
    /// filters
    #[must_use]
    pub fn new() -> Self {
        let mut serializers: HashMap<String, Arc<dyn Serializer>> = HashMap::new();
        serializers.insert("yaml".to_string(), Arc::new(YamlSerializer));
        serializers.insert("json".to_string(), Arc::new(JsonSerializer));

        let mut persisters: HashMap<String, Arc<dyn Persister>> = HashMap::new();
        persisters.insert("filesystem".to_string(), Arc::new(FilesystemPersister));
        persisters.insert("dedup".to_string(), Arc::new(DedupingPersister));
        persisters.insert("cached".to_string(), Arc::new(CachingPersister::new()));

        Self {
            record_mode: RecordMode::default(),
            match_on: DEFAULT_MATCH_ON.iter().map(ToString::to_string).collect(),
            serializer: "yaml".to_string(),
            persister: "filesystem".to_string(),
            cassette_library_dir: None,
            filter_headers: Vec::new(),
            filter_query_parameters: Vec::new(),
            filter_post_data_parameters: Vec::new(),
            ignore_hosts: Vec::new(),
            ignore_localhost: false,
            before_record: None,
            matchers: MatcherRegistry::with_builtins(),
            serializers,
            persisters,
        }
    }

    /// Load the declarative configuration subset from a TOML file.
    ///
    /// Callbacks and custom matchers cannot be expressed in a file; register
    /// them afterwards.
    ///
    /// # Errors
    ///
    /// Returns `ReelError::Config` if the file cannot be read, parsed or
    /// validated
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ReelError::Config(format!("Failed to read config file: {e}")))?;

        let file: RecorderFile = toml::from_str(&content)
            .map_err(|e| ReelError::Config(format!("Failed to parse config: {e}")))?;

        let mut recorder = Self::new();
        recorder.record_mode = file.record_mode;
        if let Some(match_on) = file.match_on {
            recorder.match_on = match_on;
        }
        if let Some(serializer) = file.serializer {
            recorder.serializer = serializer;
        }
        if let Some(persister) = file.persister {
            recorder.persister = persister;
        }
        recorder.cassette_library_dir = file.cassette_library_dir;
        recorder.filter_headers = file.filter_headers;
        recorder.filter_query_parameters = file.filter_query_parameters;
        recorder.filter_post_data_parameters = file.filter_post_data_parameters;
        recorder.ignore_hosts = file.ignore_hosts;
        recorder.ignore_localhost = file.ignore_localhost;

        recorder.validate()?;
        Ok(recorder)
    }

    /// Validate the resolved configuration
    ///
    /// # Errors
    ///
    /// Returns `ReelError::Config` if a referenced matcher, serializer or
    /// persister is unknown, the matcher set is empty, or the cassette
    /// library directory does not exist
    pub fn validate(&self) -> Result<()> {
        if self.match_on.is_empty() {
            return Err(ReelError::Config(
                "match_on cannot be empty: every cassette needs at least one matcher".to_string(),
            ));
        }

        for name in &self.match_on {
            if self.matchers.get(name).is_none() {
                return Err(ReelError::Config(format!(
                    "unknown matcher '{name}' in match_on"
                )));
            }
        }

        if !self.serializers.contains_key(&self.serializer) {
            return Err(ReelError::Config(format!(
                "unknown serializer '{}'",
                self.serializer
            )));
        }

        if !self.persisters.contains_key(&self.persister) {
            return Err(ReelError::Config(format!(
                "unknown persister '{}'",
                self.persister
            )));
        }

        if let Some(dir) = &self.cassette_library_dir {
            if !dir.exists() {
                return Err(ReelError::Config(format!(
                    "Cassette library directory does not exist: {}",
                    dir.display()
                )));
            }
        }

        Ok(())
    }

    /// Set the record mode
    #[must_use]
    pub fn record_mode(mut self, mode: RecordMode) -> Self {
        self.record_mode = mode;
        self
    }

    /// Set the ordered matcher names cassettes compare under
    #[must_use]
    pub fn match_on(mut self, names: Vec<String>) -> Self {
        self.match_on = names;
        self
    }

    /// Select the serializer by registered name
    #[must_use]
    pub fn serializer(mut self, name: impl Into<String>) -> Self {
        self.serializer = name.into();
        self
    }

    /// Select the persister by registered name
    #[must_use]
    pub fn persister(mut self, name: impl Into<String>) -> Self {
        self.persister = name.into();
        self
    }

    /// Resolve cassette names against this directory
    #[must_use]
    pub fn cassette_library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cassette_library_dir = Some(dir.into());
        self
    }

    /// Strip these headers before matching and persistence
    #[must_use]
    pub fn filter_headers(mut self, names: Vec<String>) -> Self {
        self.filter_headers = names;
        self
    }

    /// Strip these query parameters before matching and persistence
    #[must_use]
    pub fn filter_query_parameters(mut self, names: Vec<String>) -> Self {
        self.filter_query_parameters = names;
        self
    }

    /// Strip these form-encoded body parameters before matching and
    /// persistence
    #[must_use]
    pub fn filter_post_data_parameters(mut self, names: Vec<String>) -> Self {
        self.filter_post_data_parameters = names;
        self
    }

    /// Never let requests to these hosts touch a cassette
    #[must_use]
    pub fn ignore_hosts(mut self, hosts: Vec<String>) -> Self {
        self.ignore_hosts = hosts;
        self
    }

    /// Never let localhost requests touch a cassette
    #[must_use]
    pub fn ignore_localhost(mut self, ignore: bool) -> Self {
        self.ignore_localhost = ignore;
        self
    }

    /// Install the final arbitrary filter stage
    #[must_use]
    pub fn before_record(
        mut self,
        callback: impl Fn(Request) -> FilterOutcome + Send + Sync + 'static,
    ) -> Self {
        self.before_record = Some(Arc::new(callback));
        self
    }

    /// Register a custom matcher under a new name
    pub fn register_matcher(
        &mut self,
        name: impl Into<String>,
        matcher: impl Fn(&Request, &Request) -> bool + Send + Sync + 'static,
    ) {
        self.matchers.register(name, matcher);
    }

    /// Register a custom serializer under a new name
    pub fn register_serializer(&mut self, name: impl Into<String>, serializer: Arc<dyn Serializer>) {
        self.serializers.insert(name.into(), serializer);
    }

    /// Register a custom persister under a new name
    pub fn register_persister(&mut self, name: impl Into<String>, persister: Arc<dyn Persister>) {
        self.persisters.insert(name.into(), persister);
    }

    /// Produce a configured cassette for `name`, resolved against the
    /// cassette library directory when one is set
    ///
    /// # Errors
    ///
    /// Returns `ReelError::Config` for unknown matcher/serializer/persister
    /// names and `ReelError::Format` for an unloadable cassette file
    pub fn use_cassette(&self, name: impl AsRef<Path>) -> Result<Cassette> {
        let path = match &self.cassette_library_dir {
            Some(dir) => dir.join(name.as_ref()),
            None => name.as_ref().to_path_buf(),
        };

        let serializer = self
            .serializers
            .get(&self.serializer)
            .cloned()
            .ok_or_else(|| {
                ReelError::Config(format!("unknown serializer '{}'", self.serializer))
            })?;
        let persister = self
            .persisters
            .get(&self.persister)
            .cloned()
            .ok_or_else(|| ReelError::Config(format!("unknown persister '{}'", self.persister)))?;

        let match_set = MatchSet::from_names(&self.match_on, &self.matchers)?;

        let mut filters = FilterChain::new()
            .strip_headers(self.filter_headers.clone())
            .strip_query_parameters(self.filter_query_parameters.clone())
            .strip_post_data_parameters(self.filter_post_data_parameters.clone())
            .ignore_hosts(self.ignore_hosts.clone())
            .ignore_localhost(self.ignore_localhost);
        if let Some(callback) = &self.before_record {
            let callback = Arc::clone(callback);
            filters = filters.before_record(move |request| callback(request));
        }

        Cassette::load(
            path,
            CassetteOptions {
                record_mode: self.record_mode,
                match_set,
                filters,
                serializer,
                persister,
            },
        )
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Declarative subset of the recorder configuration, as stored in TOML
#[derive(Debug, Deserialize)]
struct RecorderFile {
    #[serde(default)]
    record_mode: RecordMode,
    #[serde(default)]
    match_on: Option<Vec<String>>,
    #[serde(default)]
    serializer: Option<String>,
    #[serde(default)]
    persister: Option<String>,
    #[serde(default)]
    cassette_library_dir: Option<PathBuf>,
    #[serde(default)]
    filter_headers: Vec<String>,
    #[serde(default)]
    filter_query_parameters: Vec<String>,
    #[serde(default)]
    filter_post_data_parameters: Vec<String>,
    #[serde(default)]
    ignore_hosts: Vec<String>,
    #[serde(default)]
    ignore_localhost: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_defaults() {
        let recorder = Recorder::new();

        assert!(recorder.validate().is_ok());
        assert_eq!(recorder.record_mode, RecordMode::Once);
        assert_eq!(recorder.serializer, "yaml");
        assert_eq!(recorder.persister, "filesystem");
    }

    #[test]
    fn test_config_file_parse() {
        let dir = TempDir::new().unwrap();
        let mut file = NamedTempFile::new().unwrap();
        let config_toml = format!(
            r#"
            record_mode = "new_episodes"
            cassette_library_dir = "{}"
            match_on = ["method", "uri"]
            serializer = "json"
            persister = "dedup"
            filter_headers = ["authorization"]
            ignore_localhost = true
            "#,
            dir.path().display()
        );
        file.write_all(config_toml.as_bytes()).unwrap();

        let recorder = Recorder::from_file(file.path()).unwrap();
        assert_eq!(recorder.record_mode, RecordMode::NewEpisodes);
        assert_eq!(recorder.match_on, vec!["method", "uri"]);
        assert_eq!(recorder.serializer, "json");
        assert_eq!(recorder.persister, "dedup");
        assert_eq!(recorder.filter_headers, vec!["authorization"]);
        assert!(recorder.ignore_localhost);
    }

    #[test]
    fn test_config_file_missing_dir_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"cassette_library_dir = \"/does/not/exist\"\n")
            .unwrap();

        assert!(Recorder::from_file(file.path()).is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_names() {
        assert!(Recorder::new()
            .match_on(vec!["nonsense".into()])
            .validate()
            .is_err());
        assert!(Recorder::new().serializer("msgpack").validate().is_err());
        assert!(Recorder::new().persister("s3").validate().is_err());
        assert!(Recorder::new().match_on(Vec::new()).validate().is_err());
    }

    #[test]
    fn test_use_cassette_resolves_library_dir() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::new().cassette_library_dir(dir.path());

        let cassette = recorder.use_cassette("example.yaml").unwrap();
        assert_eq!(cassette.path(), dir.path().join("example.yaml"));
    }

    #[test]
    fn test_use_cassette_unknown_serializer() {
        let recorder = Recorder::new().serializer("msgpack");
        assert!(recorder.use_cassette("x.yaml").is_err());
    }

    #[test]
    fn test_registered_custom_serializer_is_usable() {
        let mut recorder = Recorder::new();
        recorder.register_serializer("yaml2", Arc::new(YamlSerializer));
        let recorder = recorder.serializer("yaml2");

        assert!(recorder.validate().is_ok());
    }

    #[test]
    fn test_custom_matcher_via_recorder() {
        let dir = TempDir::new().unwrap();
        let mut recorder = Recorder::new();
        recorder.register_matcher("method_prefix", |a, b| {
            a.method().starts_with(&b.method()[..1])
        });
        let recorder = recorder
            .cassette_library_dir(dir.path())
            .match_on(vec!["method_prefix".into()]);

        assert!(recorder.use_cassette("x.yaml").is_ok());
    }
}
