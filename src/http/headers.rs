//! Ordered, case-insensitive, multi-valued header map

/// Ordered multimap of HTTP headers.
///
/// Entries keep their insertion order and the original casing they were
/// inserted with. Lookups fold names to lowercase, so `get("accept")` and
/// `get("Accept")` are the same query. HTTP permits repeated headers, so a
/// logical name may carry several values; `get` returns the first and
/// `get_all` every one, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    /// Create an empty header map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a header map from name/value pairs, preserving order
    pub fn from_pairs<I, N, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        }
    }

    /// Append a header, keeping any existing values for the same name
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replace every value of `name` with a single value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push((name, value.into()));
    }

    /// Remove every occurrence of `name` (case-insensitive).
    ///
    /// Returns true if anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let folded = name.to_lowercase();
        let before = self.entries.len();
        self.entries.retain(|(n, _)| n.to_lowercase() != folded);
        self.entries.len() != before
    }

    /// First value for `name`, if any
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        let folded = name.to_lowercase();
        self.entries
            .iter()
            .find(|(n, _)| n.to_lowercase() == folded)
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `name`, in insertion order
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        let folded = name.to_lowercase();
        self.entries
            .iter()
            .filter(|(n, _)| n.to_lowercase() == folded)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Whether any value exists for `name`
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Original casing of the first occurrence of `name`, if present
    #[must_use]
    pub fn canonical_name(&self, name: &str) -> Option<&str> {
        let folded = name.to_lowercase();
        self.entries
            .iter()
            .find(|(n, _)| n.to_lowercase() == folded)
            .map(|(n, _)| n.as_str())
    }

    /// Number of stored entries (counting repeats)
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries as `(name, value)` in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Distinct folded (lowercased) names, in first-occurrence order
    #[must_use]
    pub fn folded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for (n, _) in &self.entries {
            let folded = n.to_lowercase();
            if !names.contains(&folded) {
                names.push(folded);
            }
        }
        names
    }
}

impl PartialEq for HeaderMap {
    /// Structural equality: case-insensitive on names, order-sensitive on
    /// the value list of each logical name.
    fn eq(&self, other: &Self) -> bool {
        if self.entries.len() != other.entries.len() {
            return false;
        }
        let names = self.folded_names();
        if names != other.folded_names() {
            return false;
        }
        names
            .iter()
            .all(|name| self.get_all(name) == other.get_all(name))
    }
}

impl Eq for HeaderMap {}

impl<'a> IntoIterator for &'a HeaderMap {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str())))
    }
}
