use shadejar_api::{ArchiveId, AssemblyError, DEFAULT_CHANNEL_CAPACITY, Entry, Ordinal};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Upper bound on concurrently scanned archives; `None` uses all cores.
    pub workers: Option<usize>,
    /// Entries buffered between the scan workers and the consumer.
    pub channel_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScannedEntry {
    pub ordinal: Ordinal,
    pub archive: Arc<ArchiveId>,
    pub entry: Entry,
}

#[derive(Debug, Default, Clone)]
pub struct ScanSummary {
    pub archives: usize,
    pub entries: usize,
    pub bytes: u64,
    pub duration: Duration,
}

#[derive(Debug)]
pub(crate) enum ScanEvent {
    Entry(ScannedEntry),
    Finished {
        archive: Arc<ArchiveId>,
        entries: usize,
        bytes: u64,
    },
    Failed(AssemblyError),
}
