//! Drives one assembly: scan, resolve, relocate, write.

use crate::manifest::synthesize;
use crate::policy::PolicyTable;
use crate::relocate::{RelocationStats, Relocator};
use crate::resolve::{ResolveStats, Resolver};
use crate::writer::{ArchiveWriter, WriteSummary};
use shadejar_api::{AssemblyConfig, AssemblyError, Result};
use shadejar_ingest::{ArchiveScanner, ScanConfig, ScanSummary};
use std::cell::Cell;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    Idle,
    Reading,
    Resolving,
    Relocating,
    Writing,
    Done,
    Failed,
}

impl AssemblyState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssemblyState::Done | AssemblyState::Failed)
    }
}

impl fmt::Display for AssemblyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssemblyState::Idle => "idle",
            AssemblyState::Reading => "reading",
            AssemblyState::Resolving => "resolving",
            AssemblyState::Relocating => "relocating",
            AssemblyState::Writing => "writing",
            AssemblyState::Done => "done",
            AssemblyState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct AssemblyReport {
    pub output: PathBuf,
    pub scan: ScanSummary,
    pub resolve: ResolveStats,
    /// `None` when no relocation rules are configured.
    pub relocation: Option<RelocationStats>,
    pub write: WriteSummary,
    pub elapsed: Duration,
}

impl AssemblyReport {
    /// Files in the output archive, manifest included.
    pub fn entries_written(&self) -> usize {
        self.write.files
    }
}

/// Assembles one output archive from an [`AssemblyConfig`].
///
/// Everything that can be checked without touching the inputs is checked in
/// [`Assembler::new`]; [`Assembler::run`] either persists a complete archive
/// or leaves the output path as it was.
pub struct Assembler {
    config: AssemblyConfig,
    policies: PolicyTable,
    relocator: Option<Relocator>,
    cancel: CancellationToken,
    state: Cell<AssemblyState>,
}

impl Assembler {
    pub fn new(config: AssemblyConfig) -> Result<Self> {
        config.validate()?;
        let policies = PolicyTable::new(&config.merge)?;
        let relocator = if config.relocations.is_empty() {
            None
        } else {
            Some(Relocator::new(&config.relocations)?)
        };
        Ok(Self {
            config,
            policies,
            relocator,
            cancel: CancellationToken::new(),
            state: Cell::new(AssemblyState::Idle),
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    pub fn state(&self) -> AssemblyState {
        self.state.get()
    }

    fn enter(&self, next: AssemblyState) {
        debug!("Assembly {} -> {}", self.state.get(), next);
        self.state.set(next);
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AssemblyError::Cancelled);
        }
        Ok(())
    }

    pub fn run(&self) -> Result<AssemblyReport> {
        let start = Instant::now();
        match self.execute(start) {
            Ok(report) => {
                self.enter(AssemblyState::Done);
                info!(
                    "Assembled {} ({} entries) in {:?}",
                    report.output.display(),
                    report.entries_written(),
                    report.elapsed
                );
                Ok(report)
            }
            Err(e) => {
                error!("Assembly failed while {}: {}", self.state.get(), e);
                self.enter(AssemblyState::Failed);
                Err(e)
            }
        }
    }

    fn execute(&self, start: Instant) -> Result<AssemblyReport> {
        self.enter(AssemblyState::Reading);
        self.check_cancelled()?;

        let archives = self.config.input_archives();
        for archive in &archives {
            if !archive.path.exists() {
                return Err(AssemblyError::NotFound {
                    path: archive.path.clone(),
                });
            }
        }
        info!(
            "Assembling {} from {} archives",
            self.config.output.display(),
            archives.len()
        );

        let scanner = ArchiveScanner::new(ScanConfig {
            workers: self.config.workers,
            channel_capacity: self.config.channel_capacity,
        });
        let mut resolver = Resolver::new(&self.policies);
        let scan = scanner.scan(&archives, &self.cancel, |scanned| resolver.ingest(scanned))?;

        self.enter(AssemblyState::Resolving);
        self.check_cancelled()?;
        let resolution = resolver.finalize()?;

        let mut entries = resolution.entries;
        let mut manifest = synthesize(
            &self.config.manifest,
            &self.config.entry_point,
            &resolution.manifests,
        );

        let mut relocation = None;
        if let Some(relocator) = &self.relocator {
            self.enter(AssemblyState::Relocating);
            self.check_cancelled()?;
            let (relocated, stats) = relocator.relocate(entries)?;
            entries = relocated;
            manifest = relocator.relocate_manifest(manifest);
            relocation = Some(stats);
        }

        self.enter(AssemblyState::Writing);
        self.check_cancelled()?;
        let write = ArchiveWriter::new(&self.config.output)
            .with_cancellation(self.cancel.clone())
            .write(&manifest, &entries)?;

        Ok(AssemblyReport {
            output: self.config.output.clone(),
            scan,
            resolve: resolution.stats,
            relocation,
            write,
            elapsed: start.elapsed(),
        })
    }
}
