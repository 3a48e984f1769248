use super::archive::ArchiveId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::sync::Arc;

/// Handling class of an archive entry. Closed set; downstream code matches
/// on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryTag {
    Directory,
    BinaryUnit,
    ServiceRegistration,
    TopLevelManifest,
    SignatureFile,
    OrdinaryResource,
}

impl EntryTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryTag::Directory => "directory",
            EntryTag::BinaryUnit => "binary-unit",
            EntryTag::ServiceRegistration => "service-registration",
            EntryTag::TopLevelManifest => "top-level-manifest",
            EntryTag::SignatureFile => "signature-file",
            EntryTag::OrdinaryResource => "ordinary-resource",
        }
    }
}

/// A raw entry as read from an input archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: String,
    pub payload: Vec<u8>,
    pub size: u64,
    pub is_dir: bool,
}

impl Entry {
    pub fn file(path: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            size: payload.len() as u64,
            payload,
            is_dir: false,
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            payload: Vec::new(),
            size: 0,
            is_dir: true,
        }
    }
}

/// An entry that survived conflict resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub path: String,
    pub tag: EntryTag,
    pub payload: Vec<u8>,
    /// First archive (by rank) that contributed to the payload.
    pub origin: Arc<ArchiveId>,
}

/// Output path -> final entry. Paths are unique: a second insert for the
/// same path is refused and handed back to the caller.
#[derive(Debug, Clone, Default)]
pub struct ResolvedEntrySet {
    entries: BTreeMap<String, ResolvedEntry>,
}

impl ResolvedEntrySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: ResolvedEntry) -> Result<(), Box<ResolvedEntry>> {
        match self.entries.entry(entry.path.clone()) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
            btree_map::Entry::Occupied(_) => Err(Box::new(entry)),
        }
    }

    pub fn get(&self, path: &str) -> Option<&ResolvedEntry> {
        self.entries.get(path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut ResolvedEntry> {
        self.entries.get_mut(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in lexical path order.
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedEntry> {
        self.entries.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl IntoIterator for ResolvedEntrySet {
    type Item = ResolvedEntry;
    type IntoIter = btree_map::IntoValues<String, ResolvedEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}
