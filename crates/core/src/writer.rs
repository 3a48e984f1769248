use crate::manifest::render;
use shadejar_api::{AssemblyError, MANIFEST_PATH, OutputManifest, ResolvedEntry, ResolvedEntrySet, Result};
use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

const FILE_MODE: u32 = 0o644;
const DIR_MODE: u32 = 0o755;

#[derive(Debug, Default, Clone)]
pub struct WriteSummary {
    pub files: usize,
    pub directories: usize,
    /// Uncompressed payload bytes, manifest included.
    pub bytes: u64,
}

/// Writes the output archive. Nothing is visible at the output path until
/// the archive is complete: entries go to a temporary file next to it,
/// which is renamed into place at the end.
pub struct ArchiveWriter {
    output: PathBuf,
    cancel: CancellationToken,
}

enum Item<'a> {
    Directory,
    File(&'a ResolvedEntry),
}

impl ArchiveWriter {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn write(&self, manifest: &OutputManifest, entries: &ResolvedEntrySet) -> Result<WriteSummary> {
        let fail = |reason: &dyn std::fmt::Display| AssemblyError::write(&self.output, reason);

        let dir = match self.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| fail(&e))?;
        let temp = tempfile::Builder::new()
            .prefix(".shadejar-")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| fail(&e))?;
        debug!("Writing {} via {}", self.output.display(), temp.path().display());

        let (temp, summary) = self.write_entries(temp, manifest, entries)?;

        temp.as_file().sync_all().map_err(|e| fail(&e))?;
        temp.persist(&self.output).map_err(|e| fail(&e.error))?;

        info!(
            "Wrote {} ({} files, {} directories, {} bytes)",
            self.output.display(),
            summary.files,
            summary.directories,
            summary.bytes
        );
        Ok(summary)
    }

    fn write_entries(
        &self,
        temp: NamedTempFile,
        manifest: &OutputManifest,
        entries: &ResolvedEntrySet,
    ) -> Result<(NamedTempFile, WriteSummary)> {
        let fail = |reason: &dyn std::fmt::Display| AssemblyError::write(&self.output, reason);

        let stamp = DateTime::default();
        let file_options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(stamp)
            .unix_permissions(FILE_MODE);
        let dir_options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .last_modified_time(stamp)
            .unix_permissions(DIR_MODE);

        let mut zip = ZipWriter::new(BufWriter::new(temp));
        let mut summary = WriteSummary::default();

        let manifest_bytes = render(manifest);
        zip.start_file(MANIFEST_PATH, file_options).map_err(|e| fail(&e))?;
        zip.write_all(&manifest_bytes).map_err(|e| fail(&e))?;
        summary.files += 1;
        summary.bytes += manifest_bytes.len() as u64;

        for (path, item) in layout(entries) {
            if self.cancel.is_cancelled() {
                return Err(AssemblyError::Cancelled);
            }
            match item {
                Item::Directory => {
                    zip.add_directory(path, dir_options).map_err(|e| fail(&e))?;
                    summary.directories += 1;
                }
                Item::File(entry) => {
                    zip.start_file(path, file_options).map_err(|e| fail(&e))?;
                    zip.write_all(&entry.payload).map_err(|e| fail(&e))?;
                    summary.files += 1;
                    summary.bytes += entry.payload.len() as u64;
                }
            }
        }

        let buffered = zip.finish().map_err(|e| fail(&e))?;
        let temp = buffered.into_inner().map_err(|e| fail(e.error()))?;
        Ok((temp, summary))
    }
}

/// Every output path after the manifest, with parent directories
/// synthesized, in lexical order.
fn layout(entries: &ResolvedEntrySet) -> BTreeMap<&str, Item<'_>> {
    let mut items = BTreeMap::new();
    items.insert("META-INF/", Item::Directory);
    for entry in entries.iter() {
        if entry.path == MANIFEST_PATH {
            continue;
        }
        let path = entry.path.as_str();
        for (i, _) in path.match_indices('/') {
            items.entry(&path[..=i]).or_insert(Item::Directory);
        }
        items.insert(path, Item::File(entry));
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use shadejar_api::{ArchiveId, EntryTag, MAIN_CLASS};
    use std::fs::File;
    use std::io::Read;
    use std::sync::Arc;
    use tempfile::tempdir;
    use zip::ZipArchive;

    fn manifest() -> OutputManifest {
        let mut attributes = IndexMap::new();
        attributes.insert("Manifest-Version".to_string(), "1.0".to_string());
        attributes.insert(MAIN_CLASS.to_string(), "app.Main".to_string());
        OutputManifest {
            entry_point: "app.Main".to_string(),
            attributes,
        }
    }

    fn entries(paths: &[(&str, &[u8])]) -> ResolvedEntrySet {
        let origin = Arc::new(ArchiveId::new("app", None));
        let mut set = ResolvedEntrySet::new();
        for (path, payload) in paths {
            set.insert(ResolvedEntry {
                path: path.to_string(),
                tag: EntryTag::OrdinaryResource,
                payload: payload.to_vec(),
                origin: origin.clone(),
            })
            .unwrap();
        }
        set
    }

    fn names(path: &Path) -> Vec<String> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_manifest_first_then_lexical_with_directories() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out/app.jar");
        let set = entries(&[("b/c/x.txt", b"x"), ("a.txt", b"a"), ("META-INF/services/s", b"p\n")]);

        let summary = ArchiveWriter::new(&output).write(&manifest(), &set).unwrap();

        assert_eq!(
            names(&output),
            vec![
                "META-INF/MANIFEST.MF",
                "META-INF/",
                "META-INF/services/",
                "META-INF/services/s",
                "a.txt",
                "b/",
                "b/c/",
                "b/c/x.txt",
            ]
        );
        assert_eq!(summary.files, 4);
        assert_eq!(summary.directories, 4);

        let mut archive = ZipArchive::new(File::open(&output).unwrap()).unwrap();
        let mut text = String::new();
        archive
            .by_name("META-INF/MANIFEST.MF")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert!(text.contains("Main-Class: app.Main\r\n"));
    }

    #[test]
    fn test_output_is_byte_identical_across_runs() {
        let dir = tempdir().unwrap();
        let set = entries(&[("a.txt", b"hello"), ("lib/b.bin", &[0u8, 1, 2, 3])]);
        let first = dir.path().join("first.jar");
        let second = dir.path().join("second.jar");
        ArchiveWriter::new(&first).write(&manifest(), &set).unwrap();
        ArchiveWriter::new(&second).write(&manifest(), &set).unwrap();
        assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
    }

    #[test]
    fn test_cancelled_write_leaves_previous_output() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("app.jar");
        std::fs::write(&output, b"previous").unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let err = ArchiveWriter::new(&output)
            .with_cancellation(token)
            .write(&manifest(), &entries(&[("a.txt", b"a")]))
            .unwrap_err();

        assert!(matches!(err, AssemblyError::Cancelled));
        assert_eq!(std::fs::read(&output).unwrap(), b"previous");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1, "temporary file was not removed: {leftovers:?}");
    }

    #[test]
    fn test_unwritable_destination_is_write_error() {
        let dir = tempdir().unwrap();
        // A directory in the way of the output file.
        let output = dir.path().join("taken");
        std::fs::create_dir(&output).unwrap();
        std::fs::write(output.join("keep"), b"x").unwrap();

        let err = ArchiveWriter::new(&output)
            .write(&manifest(), &entries(&[("a.txt", b"a")]))
            .unwrap_err();
        assert_eq!(err.kind(), shadejar_api::ErrorKind::WriteError);
        assert!(output.join("keep").exists());
    }
}
