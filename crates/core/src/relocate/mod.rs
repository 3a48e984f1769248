//! Namespace relocation of the resolved entry set.

pub mod classfile;
mod matcher;

pub use matcher::{NamespaceMatcher, validate_rules};

use crate::classify::{SERVICES_DIR, service_name};
use crate::resolve::merge_registrations;
use classfile::ClassFileError;
use rayon::prelude::*;
use ristretto_classfile::ClassFile;
use shadejar_api::{
    AssemblyError, EntryTag, OutputManifest, RelocationRule, ResolvedEntry, ResolvedEntrySet,
    Result,
};
use std::io::Cursor;
use tracing::{debug, info};

/// Resource extensions always rewritten as text, whatever their encoding.
/// Other resources are rewritten when they are valid UTF-8.
const TEXT_EXTENSIONS: &[&str] = &[
    "properties", "xml", "txt", "json", "conf", "yaml", "yml", "mf", "list",
];

#[derive(Debug, Default, Clone)]
pub struct RelocationStats {
    /// Binary units moved into a target namespace.
    pub units_relocated: usize,
    /// Binary units whose constant pool changed.
    pub units_rewritten: usize,
    /// Utf8 constants rewritten across all units.
    pub references_rewritten: usize,
    pub services_relocated: usize,
    /// Relocated service files merged into a registration already at that path.
    pub services_merged: usize,
    pub resources_relocated: usize,
    pub resources_rewritten: usize,
}

#[derive(Default)]
struct Outcome {
    moved: bool,
    rewritten: bool,
    constants: usize,
}

pub struct Relocator {
    matcher: NamespaceMatcher,
}

impl Relocator {
    pub fn new(rules: &[RelocationRule]) -> Result<Self> {
        Ok(Self {
            matcher: NamespaceMatcher::new(rules)?,
        })
    }

    pub fn matcher(&self) -> &NamespaceMatcher {
        &self.matcher
    }

    /// Rewrites every entry and moves the ones inside a source namespace.
    /// Fails instead of producing an archive with a partial rewrite.
    pub fn relocate(&self, entries: ResolvedEntrySet) -> Result<(ResolvedEntrySet, RelocationStats)> {
        let input: Vec<ResolvedEntry> = entries.into_iter().collect();
        let relocated = input
            .into_par_iter()
            .map(|entry| self.relocate_entry(entry))
            .collect::<Result<Vec<_>>>()?;

        let mut stats = RelocationStats::default();
        let mut output = ResolvedEntrySet::new();
        // Entries already at their final path go in first so a moved service
        // file appends its providers after the ones registered there.
        let (stayed, moved): (Vec<_>, Vec<_>) =
            relocated.into_iter().partition(|(_, outcome)| !outcome.moved);
        for (entry, outcome) in stayed.into_iter().chain(moved) {
            match entry.tag {
                EntryTag::BinaryUnit => {
                    stats.units_relocated += usize::from(outcome.moved);
                    stats.units_rewritten += usize::from(outcome.rewritten);
                    stats.references_rewritten += outcome.constants;
                }
                EntryTag::ServiceRegistration => {
                    stats.services_relocated += usize::from(outcome.moved)
                }
                _ => {
                    stats.resources_relocated += usize::from(outcome.moved);
                    stats.resources_rewritten += usize::from(outcome.rewritten);
                }
            }
            let rejected = match output.insert(entry) {
                Ok(()) => continue,
                Err(rejected) => rejected,
            };
            if let Some(existing) = output
                .get_mut(&rejected.path)
                .filter(|existing| {
                    existing.tag == EntryTag::ServiceRegistration
                        && rejected.tag == EntryTag::ServiceRegistration
                })
            {
                debug!(
                    "Merging relocated providers from {} into {}",
                    rejected.origin, rejected.path
                );
                existing.payload = merge_registrations(
                    [existing.payload.as_slice(), rejected.payload.as_slice()].into_iter(),
                );
                stats.services_merged += 1;
                continue;
            }
            let namespace = self
                .matcher
                .target_rule(&rejected.path)
                .map(|rule| rule.from.clone())
                .unwrap_or_default();
            return Err(AssemblyError::relocation(
                namespace,
                &rejected.path,
                format!("relocated path collides with an entry from {}", rejected.origin),
            ));
        }

        info!(
            "Relocation: {} units moved, {} units rewritten ({} references), {} services ({} merged), {} resources moved, {} resources rewritten",
            stats.units_relocated,
            stats.units_rewritten,
            stats.references_rewritten,
            stats.services_relocated,
            stats.services_merged,
            stats.resources_relocated,
            stats.resources_rewritten
        );
        Ok((output, stats))
    }

    fn relocate_entry(&self, mut entry: ResolvedEntry) -> Result<(ResolvedEntry, Outcome)> {
        let mut outcome = Outcome::default();
        match entry.tag {
            EntryTag::BinaryUnit => {
                let new_path = self.matcher.relocate_path(&entry.path);
                if let Some((bytes, constants)) = self.rewrite_unit(&entry, new_path.is_some())? {
                    entry.payload = bytes;
                    outcome.rewritten = true;
                    outcome.constants = constants;
                }
                if let Some(path) = new_path {
                    debug!("Relocating {} -> {}", entry.path, path);
                    entry.path = path;
                    outcome.moved = true;
                }
            }
            EntryTag::ServiceRegistration => {
                if let Some(renamed) = service_name(&entry.path)
                    .and_then(|name| self.matcher.relocate_name(name))
                {
                    entry.path = format!("{SERVICES_DIR}{renamed}");
                    outcome.moved = true;
                }
                if let Some(content) = self.matcher.rewrite(&entry.payload) {
                    // Two providers may now be the same name.
                    entry.payload = merge_registrations(std::iter::once(content.as_slice()));
                    outcome.rewritten = true;
                }
            }
            EntryTag::OrdinaryResource => {
                if is_text_resource(&entry.path) || std::str::from_utf8(&entry.payload).is_ok() {
                    if let Some(content) = self.matcher.rewrite(&entry.payload) {
                        entry.payload = content;
                        outcome.rewritten = true;
                    }
                } else if let Some(rule) = self.matcher.find(&entry.payload) {
                    return Err(AssemblyError::relocation(
                        &rule.from,
                        &entry.path,
                        "binary resource references the namespace and cannot be rewritten",
                    ));
                }
                if let Some(path) = self.matcher.relocate_path(&entry.path) {
                    entry.path = path;
                    outcome.moved = true;
                }
            }
            EntryTag::Directory | EntryTag::SignatureFile | EntryTag::TopLevelManifest => {}
        }
        Ok((entry, outcome))
    }

    /// Rewritten class bytes and the number of changed constants, or `None`
    /// when the unit does not reference any source namespace.
    fn rewrite_unit(&self, entry: &ResolvedEntry, moving: bool) -> Result<Option<(Vec<u8>, usize)>> {
        let rewritten = match classfile::rewrite_utf8_constants(&entry.payload, |value| {
            self.matcher.rewrite(value)
        }) {
            Ok(rewritten) => rewritten,
            Err(ClassFileError::Utf8TooLong { index, len }) => {
                let namespace = self.namespace_of(entry);
                return Err(AssemblyError::relocation(
                    namespace,
                    &entry.path,
                    format!("constant #{index} exceeds the class file limit ({len} bytes)"),
                ));
            }
            Err(e) => {
                let mentioned = self.matcher.find(&entry.payload).map(|rule| rule.from.clone());
                if mentioned.is_some() || moving {
                    return Err(AssemblyError::relocation(
                        mentioned.unwrap_or_else(|| self.namespace_of(entry)),
                        &entry.path,
                        format!("cannot be parsed as a class file: {e}"),
                    ));
                }
                debug!("Leaving unparsable unit {} untouched: {}", entry.path, e);
                return Ok(None);
            }
        };
        if rewritten.constants == 0 {
            return Ok(None);
        }

        let constants = classfile::utf8_constants(&rewritten.bytes)
            .map_err(|e| AssemblyError::relocation(self.namespace_of(entry), &entry.path, e))?;
        if let Some(rule) = constants.iter().find_map(|value| self.matcher.find(value)) {
            return Err(AssemblyError::relocation(
                &rule.from,
                &entry.path,
                "reference survived the rewrite",
            ));
        }

        ClassFile::from_bytes(&mut Cursor::new(rewritten.bytes.clone())).map_err(|e| {
            AssemblyError::relocation(
                self.namespace_of(entry),
                &entry.path,
                format!("rewritten class does not parse: {e:?}"),
            )
        })?;

        Ok(Some((rewritten.bytes, rewritten.constants)))
    }

    fn namespace_of(&self, entry: &ResolvedEntry) -> String {
        self.matcher
            .find(entry.path.as_bytes())
            .or_else(|| self.matcher.find(&entry.payload))
            .map(|rule| rule.from.clone())
            .unwrap_or_default()
    }

    /// Relocates the entry point and every attribute value.
    pub fn relocate_manifest(&self, mut manifest: OutputManifest) -> OutputManifest {
        manifest.entry_point = self.matcher.rewrite_str(&manifest.entry_point);
        for value in manifest.attributes.values_mut() {
            *value = self.matcher.rewrite_str(value);
        }
        manifest
    }
}

fn is_text_resource(path: &str) -> bool {
    path.rsplit_once('.').is_some_and(|(stem, ext)| {
        !stem.ends_with('/') && TEXT_EXTENSIONS.iter().any(|t| ext.eq_ignore_ascii_case(t))
    })
}
