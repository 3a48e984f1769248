//! Conflict resolution across all input archives.
//!
//! Entries arrive in whatever order the scan workers deliver them. Every
//! decision that depends on rank compares [`Ordinal`]s instead of arrival
//! order, so the result is the same for any interleaving. Only the payloads
//! that can still end up in the output are retained.

use crate::classify::classify;
use crate::policy::PolicyTable;
use shadejar_api::{
    ArchiveId, AssemblyError, EntryTag, MergeAction, Ordinal, ResolvedEntry, ResolvedEntrySet,
    Result,
};
use shadejar_ingest::ScannedEntry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, Default, Clone)]
pub struct ResolveStats {
    pub entries_seen: usize,
    pub duplicates: usize,
    pub conflicting_duplicates: usize,
    pub excluded: usize,
    pub signatures_dropped: usize,
    pub directories_dropped: usize,
    pub services_merged: usize,
    pub empty_omitted: usize,
}

#[derive(Debug)]
pub struct Resolution {
    pub entries: ResolvedEntrySet,
    /// Input manifests in rank order, kept for pass-through attributes.
    pub manifests: Vec<Vec<u8>>,
    pub stats: ResolveStats,
}

struct Contribution {
    ordinal: Ordinal,
    origin: Arc<ArchiveId>,
    payload: Vec<u8>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LineMode {
    Concatenate,
    Registrations,
}

enum Slot {
    Excluded,
    Keep {
        tag: EntryTag,
        keep_last: bool,
        winner: Contribution,
        hash: u64,
    },
    Lines {
        tag: EntryTag,
        mode: LineMode,
        parts: BTreeMap<Ordinal, Contribution>,
    },
}

impl Slot {
    fn open(tag: EntryTag, action: Option<MergeAction>, first: Contribution) -> Self {
        let mode = match (tag, action) {
            (_, Some(MergeAction::Exclude)) => return Slot::Excluded,
            // Registration files always merge; a generic keep/concat policy
            // cannot drop providers.
            (EntryTag::ServiceRegistration, _) | (_, Some(MergeAction::MergeServiceRegistrations)) => {
                LineMode::Registrations
            }
            (_, Some(MergeAction::ConcatenateLines)) => LineMode::Concatenate,
            (_, keep) => {
                return Slot::Keep {
                    tag,
                    keep_last: keep == Some(MergeAction::KeepLast),
                    hash: xxh3_64(&first.payload),
                    winner: first,
                };
            }
        };
        let mut parts = BTreeMap::new();
        parts.insert(first.ordinal, first);
        Slot::Lines { tag, mode, parts }
    }

    fn absorb(&mut self, path: &str, next: Contribution, stats: &mut ResolveStats) {
        match self {
            Slot::Excluded => stats.excluded += 1,
            Slot::Keep {
                keep_last,
                winner,
                hash,
                ..
            } => {
                let next_hash = xxh3_64(&next.payload);
                let replace = if *keep_last {
                    next.ordinal > winner.ordinal
                } else {
                    next.ordinal < winner.ordinal
                };
                if next_hash != *hash {
                    stats.conflicting_duplicates += 1;
                    let kept = if replace { &next.origin } else { &winner.origin };
                    warn!(
                        "Duplicate {} differs between {} and {}; keeping {}",
                        path, winner.origin, next.origin, kept
                    );
                } else {
                    debug!("Identical duplicate {} in {}", path, next.origin);
                }
                if replace {
                    *winner = next;
                    *hash = next_hash;
                }
            }
            Slot::Lines { parts, .. } => {
                parts.insert(next.ordinal, next);
            }
        }
    }
}

/// Incremental conflict resolver. Feed every scanned entry to [`ingest`],
/// then call [`finalize`] once all archives have been scanned.
///
/// [`ingest`]: Resolver::ingest
/// [`finalize`]: Resolver::finalize
pub struct Resolver<'a> {
    policies: &'a PolicyTable,
    slots: HashMap<String, Slot>,
    manifests: BTreeMap<Ordinal, Vec<u8>>,
    stats: ResolveStats,
}

impl<'a> Resolver<'a> {
    pub fn new(policies: &'a PolicyTable) -> Self {
        Self {
            policies,
            slots: HashMap::new(),
            manifests: BTreeMap::new(),
            stats: ResolveStats::default(),
        }
    }

    /// Accounts one entry. Fails fast with `AmbiguousPolicy` the first time a
    /// path is matched by two equally ranked policies.
    pub fn ingest(&mut self, scanned: ScannedEntry) -> Result<()> {
        let ScannedEntry {
            ordinal,
            archive,
            entry,
        } = scanned;
        self.stats.entries_seen += 1;

        let tag = if entry.is_dir {
            EntryTag::Directory
        } else {
            classify(&entry.path)
        };
        let contribution = Contribution {
            ordinal,
            origin: archive,
            payload: entry.payload,
        };

        match tag {
            EntryTag::Directory => self.stats.directories_dropped += 1,
            EntryTag::SignatureFile => {
                debug!("Dropping signature file {} from {}", entry.path, contribution.origin);
                self.stats.signatures_dropped += 1;
            }
            EntryTag::TopLevelManifest => {
                self.manifests.insert(ordinal, contribution.payload);
            }
            EntryTag::ServiceRegistration | EntryTag::BinaryUnit | EntryTag::OrdinaryResource => {
                if let Some(slot) = self.slots.get_mut(&entry.path) {
                    self.stats.duplicates += 1;
                    slot.absorb(&entry.path, contribution, &mut self.stats);
                } else {
                    let action = self.policies.lookup(&entry.path)?;
                    let slot = Slot::open(tag, action, contribution);
                    if matches!(slot, Slot::Excluded) {
                        debug!("Excluding {}", entry.path);
                        self.stats.excluded += 1;
                    }
                    self.slots.insert(entry.path, slot);
                }
            }
        }
        Ok(())
    }

    pub fn finalize(self) -> Result<Resolution> {
        let Resolver {
            slots,
            manifests,
            mut stats,
            ..
        } = self;
        let mut entries = ResolvedEntrySet::new();

        for (path, slot) in slots {
            let (tag, payload, origin) = match slot {
                Slot::Excluded => continue,
                Slot::Keep { tag, winner, .. } => (tag, winner.payload, winner.origin),
                Slot::Lines { tag, mode, parts } => {
                    let Some(origin) = parts.values().next().map(|c| c.origin.clone()) else {
                        continue;
                    };
                    let payloads = || parts.values().map(|c| c.payload.as_slice());
                    let payload = match mode {
                        // A lone contributor has nothing to be joined with.
                        LineMode::Concatenate if parts.len() == 1 => {
                            payloads().next().map(<[u8]>::to_vec).unwrap_or_default()
                        }
                        LineMode::Concatenate => concatenate_lines(payloads()),
                        LineMode::Registrations => {
                            if parts.len() > 1 {
                                stats.services_merged += 1;
                            }
                            merge_registrations(payloads())
                        }
                    };
                    (tag, payload, origin)
                }
            };

            if payload.is_empty() {
                debug!("Omitting empty entry {}", path);
                stats.empty_omitted += 1;
                continue;
            }
            entries
                .insert(ResolvedEntry {
                    path,
                    tag,
                    payload,
                    origin,
                })
                .map_err(|dup| {
                    AssemblyError::Internal(format!("path {} resolved twice", dup.path))
                })?;
        }

        info!(
            "Resolved {} entries ({} duplicates, {} conflicting, {} excluded, {} signatures dropped)",
            entries.len(),
            stats.duplicates,
            stats.conflicting_duplicates,
            stats.excluded,
            stats.signatures_dropped
        );
        Ok(Resolution {
            entries,
            manifests: manifests.into_values().collect(),
            stats,
        })
    }
}

/// Joins payloads in order, each terminated by a newline.
fn concatenate_lines<'p>(payloads: impl Iterator<Item = &'p [u8]>) -> Vec<u8> {
    let mut out = Vec::new();
    for payload in payloads {
        if payload.is_empty() {
            continue;
        }
        out.extend_from_slice(payload);
        if !payload.ends_with(b"\n") {
            out.push(b'\n');
        }
    }
    out
}

/// Union of provider lines, first-seen order, comments and blanks dropped.
pub(crate) fn merge_registrations<'p>(payloads: impl Iterator<Item = &'p [u8]>) -> Vec<u8> {
    let mut seen = HashSet::new();
    let mut out = String::new();
    for payload in payloads {
        for line in String::from_utf8_lossy(payload).lines() {
            let provider = line.split_once('#').map_or(line, |(before, _)| before).trim();
            if provider.is_empty() || !seen.insert(provider.to_string()) {
                continue;
            }
            out.push_str(provider);
            out.push('\n');
        }
    }
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadejar_api::{Entry, ErrorKind, MergePolicy};

    fn scanned(rank: usize, seq: usize, path: &str, payload: &[u8]) -> ScannedEntry {
        ScannedEntry {
            ordinal: Ordinal::new(rank, seq),
            archive: Arc::new(ArchiveId::new(format!("lib{rank}"), None)),
            entry: if path.ends_with('/') {
                Entry::directory(path)
            } else {
                Entry::file(path, payload.to_vec())
            },
        }
    }

    fn resolve(policies: &PolicyTable, input: Vec<ScannedEntry>) -> Resolution {
        let mut resolver = Resolver::new(policies);
        for entry in input {
            resolver.ingest(entry).unwrap();
        }
        resolver.finalize().unwrap()
    }

    fn payload<'r>(resolution: &'r Resolution, path: &str) -> &'r [u8] {
        &resolution.entries.get(path).unwrap().payload
    }

    #[test]
    fn test_service_registrations_union_in_rank_order() {
        let table = PolicyTable::empty();
        let resolution = resolve(
            &table,
            vec![
                scanned(1, 0, "META-INF/services/com.example.Plugin", b"B\nA\n"),
                scanned(0, 0, "META-INF/services/com.example.Plugin", b"# providers\nA\n\n"),
            ],
        );
        assert_eq!(payload(&resolution, "META-INF/services/com.example.Plugin"), b"A\nB\n");
        assert_eq!(resolution.stats.services_merged, 1);
    }

    #[test]
    fn test_keep_first_default_ignores_arrival_order() {
        let table = PolicyTable::empty();
        let resolution = resolve(
            &table,
            vec![
                scanned(2, 0, "config.properties", b"from=2"),
                scanned(0, 3, "config.properties", b"from=0"),
                scanned(1, 0, "config.properties", b"from=1"),
            ],
        );
        let entry = resolution.entries.get("config.properties").unwrap();
        assert_eq!(entry.payload, b"from=0");
        assert_eq!(entry.origin.name, "lib0");
        assert_eq!(resolution.stats.duplicates, 2);
        assert_eq!(resolution.stats.conflicting_duplicates, 2);
    }

    #[test]
    fn test_keep_last_policy() {
        let table =
            PolicyTable::new(&[MergePolicy::new("*.properties", MergeAction::KeepLast)]).unwrap();
        let resolution = resolve(
            &table,
            vec![
                scanned(1, 0, "config.properties", b"from=1"),
                scanned(0, 0, "config.properties", b"from=0"),
            ],
        );
        assert_eq!(payload(&resolution, "config.properties"), b"from=1");
    }

    #[test]
    fn test_concatenate_lines_policy() {
        let table =
            PolicyTable::new(&[MergePolicy::new("reference.conf", MergeAction::ConcatenateLines)])
                .unwrap();
        let resolution = resolve(
            &table,
            vec![
                scanned(1, 0, "reference.conf", b"b = 2"),
                scanned(0, 0, "reference.conf", b"a = 1\n"),
                scanned(2, 0, "reference.conf", b"a = 1\n"),
            ],
        );
        assert_eq!(payload(&resolution, "reference.conf"), b"a = 1\nb = 2\na = 1\n");
    }

    #[test]
    fn test_concatenate_leaves_single_contributor_untouched() {
        let table = PolicyTable::new(&[MergePolicy::new("data/**", MergeAction::ConcatenateLines)])
            .unwrap();
        let resolution = resolve(&table, vec![scanned(0, 0, "data/blob.bin", &[0, 1, 2, 3])]);
        assert_eq!(payload(&resolution, "data/blob.bin"), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_exclude_beats_service_merging() {
        let table = PolicyTable::new(&[MergePolicy::new(
            "META-INF/services/com.example.Plugin",
            MergeAction::Exclude,
        )])
        .unwrap();
        let resolution = resolve(
            &table,
            vec![
                scanned(0, 0, "META-INF/services/com.example.Plugin", b"A\n"),
                scanned(1, 0, "META-INF/services/com.example.Plugin", b"B\n"),
            ],
        );
        assert!(resolution.entries.is_empty());
        assert_eq!(resolution.stats.excluded, 2);
    }

    #[test]
    fn test_keep_last_does_not_override_service_merging() {
        let table = PolicyTable::new(&[MergePolicy::new("META-INF/services/*", MergeAction::KeepLast)])
            .unwrap();
        let resolution = resolve(
            &table,
            vec![
                scanned(0, 0, "META-INF/services/com.example.Plugin", b"A\n"),
                scanned(1, 0, "META-INF/services/com.example.Plugin", b"B\n"),
            ],
        );
        assert_eq!(payload(&resolution, "META-INF/services/com.example.Plugin"), b"A\nB\n");
    }

    #[test]
    fn test_drops_directories_signatures_and_empty_entries() {
        let table = PolicyTable::empty();
        let resolution = resolve(
            &table,
            vec![
                scanned(0, 0, "com/", b""),
                scanned(0, 1, "META-INF/APP.SF", b"sig"),
                scanned(0, 2, "META-INF/APP.RSA", b"sig"),
                scanned(0, 3, "empty.txt", b""),
                scanned(0, 4, "com/App.class", b"\xCA\xFE\xBA\xBE"),
            ],
        );
        let paths: Vec<&str> = resolution.entries.paths().collect();
        assert_eq!(paths, vec!["com/App.class"]);
        assert_eq!(resolution.stats.directories_dropped, 1);
        assert_eq!(resolution.stats.signatures_dropped, 2);
        assert_eq!(resolution.stats.empty_omitted, 1);
    }

    #[test]
    fn test_manifests_are_collected_in_rank_order() {
        let table = PolicyTable::empty();
        let resolution = resolve(
            &table,
            vec![
                scanned(1, 0, "META-INF/MANIFEST.MF", b"second"),
                scanned(0, 0, "META-INF/MANIFEST.MF", b"first"),
            ],
        );
        assert!(resolution.entries.is_empty());
        assert_eq!(resolution.manifests, vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn test_ambiguous_policy_fails_on_ingest() {
        let table = PolicyTable::new(&[
            MergePolicy::new("conf/*.xml", MergeAction::KeepLast).with_order(0),
            MergePolicy::new("conf/?pp.xml", MergeAction::KeepFirst).with_order(0),
        ])
        .unwrap();
        let mut resolver = Resolver::new(&table);
        let err = resolver
            .ingest(scanned(0, 0, "conf/app.xml", b"<x/>"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousPolicy);
    }
}
