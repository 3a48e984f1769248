//! Parallel archive scanning.
//!
//! One rayon job per input archive streams entries over a bounded channel to
//! a single consumer on the calling thread. Archives are independent and
//! read-only, so they are scanned concurrently; the consumer sees entries in
//! an arbitrary interleaving and must order them by [`Ordinal`].

use crate::reader::ArchiveReader;
use crate::types::{ScanConfig, ScanEvent, ScanSummary, ScannedEntry};
use shadejar_api::{AssemblyError, InputArchive, Ordinal, Result};
use std::sync::mpsc::{self, SyncSender};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct ArchiveScanner {
    config: ScanConfig,
}

impl ArchiveScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    fn worker_count(&self, archives: usize) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.config.workers.unwrap_or(cores).min(archives).max(1)
    }

    /// Scans every archive and hands each entry to `sink`.
    ///
    /// Returns the first error raised by a worker or by `sink`; remaining
    /// workers are cancelled and stop at their next entry.
    pub fn scan<F>(
        &self,
        archives: &[InputArchive],
        token: &CancellationToken,
        mut sink: F,
    ) -> Result<ScanSummary>
    where
        F: FnMut(ScannedEntry) -> Result<()>,
    {
        if token.is_cancelled() {
            return Err(AssemblyError::Cancelled);
        }
        let start = Instant::now();
        let mut summary = ScanSummary::default();
        if archives.is_empty() {
            return Ok(summary);
        }

        let workers = self.worker_count(archives.len());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("shadejar-scan-{i}"))
            .build()
            .map_err(|e| AssemblyError::Internal(format!("failed to start scan workers: {e}")))?;
        debug!("Scanning {} archives with {} workers", archives.len(), workers);

        let scan_token = token.child_token();
        let (tx, rx) = mpsc::sync_channel(self.config.channel_capacity.max(1));
        for archive in archives {
            let tx = tx.clone();
            let archive = archive.clone();
            let worker_token = scan_token.clone();
            pool.spawn(move || scan_archive(&archive, &worker_token, &tx));
        }
        drop(tx);

        // Keep draining after a failure so blocked workers can observe the
        // cancellation and exit.
        let mut failure: Option<AssemblyError> = None;
        for event in rx {
            match event {
                ScanEvent::Entry(scanned) => {
                    if failure.is_none() {
                        if let Err(e) = sink(scanned) {
                            scan_token.cancel();
                            failure = Some(e);
                        }
                    }
                }
                ScanEvent::Finished {
                    archive,
                    entries,
                    bytes,
                } => {
                    debug!("Scanned {}: {} entries, {} bytes", archive, entries, bytes);
                    summary.archives += 1;
                    summary.entries += entries;
                    summary.bytes += bytes;
                }
                ScanEvent::Failed(e) => {
                    scan_token.cancel();
                    failure.get_or_insert(e);
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }
        if token.is_cancelled() {
            return Err(AssemblyError::Cancelled);
        }

        summary.duration = start.elapsed();
        info!(
            "Scan complete: {} archives, {} entries in {:?}",
            summary.archives, summary.entries, summary.duration
        );
        Ok(summary)
    }
}

fn scan_archive(archive: &InputArchive, token: &CancellationToken, tx: &SyncSender<ScanEvent>) {
    let event = match stream_entries(archive, token, tx) {
        Ok((entries, bytes)) => ScanEvent::Finished {
            archive: archive.id.clone(),
            entries,
            bytes,
        },
        Err(e) => ScanEvent::Failed(e),
    };
    // The receiver only disappears once the scan is over.
    let _ = tx.send(event);
}

fn stream_entries(
    archive: &InputArchive,
    token: &CancellationToken,
    tx: &SyncSender<ScanEvent>,
) -> Result<(usize, u64)> {
    let reader = ArchiveReader::open(&archive.path)?;
    let mut entries = 0;
    let mut bytes = 0;

    for (seq, entry) in reader.enumerate() {
        if token.is_cancelled() {
            return Err(AssemblyError::Cancelled);
        }
        let entry = entry?;
        bytes += entry.size;
        entries += 1;

        let scanned = ScannedEntry {
            ordinal: Ordinal::new(archive.rank, seq),
            archive: archive.id.clone(),
            entry,
        };
        if tx.send(ScanEvent::Entry(scanned)).is_err() {
            return Err(AssemblyError::Cancelled);
        }
    }
    Ok((entries, bytes))
}
