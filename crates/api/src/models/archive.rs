use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Coordinates of an input archive, e.g. `jctools-core:4.0.3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArchiveId {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ArchiveId {
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}:{}", self.name, version),
            None => write!(f, "{}", self.name),
        }
    }
}

/// An archive taking part in an assembly run.
///
/// `rank` is the declaration order; rank 0 is the host application and wins
/// ties under the default `keep-first` policy.
#[derive(Debug, Clone)]
pub struct InputArchive {
    pub id: Arc<ArchiveId>,
    pub path: PathBuf,
    pub rank: usize,
}

/// Total order over every entry seen during a run: archive rank first, then
/// the entry's position inside its archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ordinal {
    pub rank: usize,
    pub seq: usize,
}

impl Ordinal {
    pub fn new(rank: usize, seq: usize) -> Self {
        Self { rank, seq }
    }
}
