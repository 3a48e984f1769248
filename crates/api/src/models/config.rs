//! Immutable configuration value handed to the assembler.
//!
//! The host build resolves dependencies and writes this out (usually as JSON);
//! nothing here is mutated once an assembly run starts.

use super::archive::{ArchiveId, InputArchive};
use super::policy::MergePolicy;
use super::relocation::RelocationRule;
use crate::error::{AssemblyError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

/// Manifest values occupy one logical line; a line break would start a new attribute.
fn check_manifest_value(field: &str, value: &str) -> Result<()> {
    if value.contains(['\r', '\n', '\0']) {
        return Err(AssemblyError::InvalidConfig(format!(
            "{field} must not contain line breaks: {value:?}"
        )));
    }
    Ok(())
}

fn check_manifest_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(AssemblyError::InvalidConfig(format!(
            "invalid manifest attribute name {name:?}"
        )));
    }
    Ok(())
}

impl ManifestSettings {
    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            check_manifest_value("manifest title", title)?;
        }
        if let Some(version) = &self.version {
            check_manifest_value("manifest version", version)?;
        }
        for name in &self.pass_through {
            check_manifest_name(name)?;
        }
        for (name, value) in &self.attributes {
            check_manifest_name(name)?;
            check_manifest_value(name, value)?;
        }
        Ok(())
    }
}

/// One resolved dependency archive. Declaration order is rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManifestSettings {
    pub title: Option<String>,
    pub version: Option<String>,
    /// Attributes copied from the input manifests (lowest rank wins).
    pub pass_through: Vec<String>,
    /// Extra attributes written verbatim, in declaration order.
    pub attributes: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssemblyConfig {
    pub inputs: Vec<InputSpec>,
    pub output: PathBuf,
    pub entry_point: String,
    #[serde(default)]
    pub merge: Vec<MergePolicy>,
    #[serde(default)]
    pub relocations: Vec<RelocationRule>,
    #[serde(default)]
    pub manifest: ManifestSettings,
    /// Scan workers; defaults to the number of available cores.
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl AssemblyConfig {
    pub fn new(output: impl Into<PathBuf>, entry_point: impl Into<String>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.into(),
            entry_point: entry_point.into(),
            merge: Vec::new(),
            relocations: Vec::new(),
            manifest: ManifestSettings::default(),
            workers: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_input(
        mut self,
        name: impl Into<String>,
        version: Option<&str>,
        path: impl Into<PathBuf>,
    ) -> Self {
        self.inputs.push(InputSpec {
            name: name.into(),
            version: version.map(str::to_string),
            path: path.into(),
        });
        self
    }

    pub fn with_policy(mut self, policy: MergePolicy) -> Self {
        self.merge.push(policy);
        self
    }

    pub fn with_relocation(mut self, rule: RelocationRule) -> Self {
        self.relocations.push(rule);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| AssemblyError::InvalidConfig(e.to_string()))
    }

    /// Loads a config file; relative input and output paths are taken
    /// relative to the file's directory.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AssemblyError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_json_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        for input in &mut self.inputs {
            if input.path.is_relative() {
                input.path = base.join(&input.path);
            }
        }
        if self.output.is_relative() {
            self.output = base.join(&self.output);
        }
    }

    /// Structural checks that need no I/O.
    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(AssemblyError::InvalidConfig(
                "at least one input archive is required".to_string(),
            ));
        }
        if self.entry_point.trim().is_empty() {
            return Err(AssemblyError::InvalidConfig(
                "entry point must not be empty".to_string(),
            ));
        }
        check_manifest_value("entry point", &self.entry_point)?;
        self.manifest.validate()?;
        if self.output.file_name().is_none() {
            return Err(AssemblyError::InvalidConfig(format!(
                "output {} does not name a file",
                self.output.display()
            )));
        }
        if self.channel_capacity == 0 {
            return Err(AssemblyError::InvalidConfig(
                "channel_capacity must be positive".to_string(),
            ));
        }
        if self.workers == Some(0) {
            return Err(AssemblyError::InvalidConfig(
                "workers must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Inputs with their rank assigned from declaration order.
    pub fn input_archives(&self) -> Vec<InputArchive> {
        self.inputs
            .iter()
            .enumerate()
            .map(|(rank, spec)| InputArchive {
                id: Arc::new(ArchiveId::new(spec.name.clone(), spec.version.clone())),
                path: spec.path.clone(),
                rank,
            })
            .collect()
    }
}
