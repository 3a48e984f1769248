use shadejar_api::{AssemblyError, Entry, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

// Declared sizes come from untrusted headers; don't reserve more than this up front.
const MAX_PREALLOCATION: u64 = 1 << 20;

/// Lazily yields the entries of one jar/zip container in central-directory
/// order.
///
/// The reader owns the file handle, so dropping it (after exhausting it,
/// abandoning it early, or hitting an error) releases the file. After the
/// first error the iterator is fused.
pub struct ArchiveReader {
    archive: ZipArchive<BufReader<File>>,
    path: PathBuf,
    cursor: usize,
    failed: bool,
}

fn corrupt(path: &Path, reason: impl ToString) -> AssemblyError {
    AssemblyError::corrupt(path.display(), reason)
}

impl ArchiveReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AssemblyError::NotFound {
                path: path.to_path_buf(),
            },
            _ => corrupt(path, e),
        })?;
        let archive = ZipArchive::new(BufReader::new(file))
            .map_err(|e| corrupt(path, format!("unreadable index: {e}")))?;

        Ok(Self {
            archive,
            path: path.to_path_buf(),
            cursor: 0,
            failed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    fn read_entry(&mut self, index: usize) -> Result<Entry> {
        let path = &self.path;
        let mut file = self
            .archive
            .by_index(index)
            .map_err(|e| corrupt(path, format!("entry #{index}: {e}")))?;

        let name = file.name().to_string();
        if file.enclosed_name().is_none() {
            return Err(corrupt(
                path,
                format!("entry {name} escapes the archive root"),
            ));
        }
        if file.is_dir() {
            return Ok(Entry::directory(name));
        }

        let mut payload = Vec::with_capacity(file.size().min(MAX_PREALLOCATION) as usize);
        file.read_to_end(&mut payload)
            .map_err(|e| corrupt(path, format!("entry {name}: {e}")))?;

        Ok(Entry {
            path: name,
            size: payload.len() as u64,
            payload,
            is_dir: false,
        })
    }
}

impl Iterator for ArchiveReader {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor >= self.archive.len() {
            return None;
        }
        let index = self.cursor;
        self.cursor += 1;

        let entry = self.read_entry(index);
        if entry.is_err() {
            self.failed = true;
        }
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadejar_api::ErrorKind;
    use std::io::Write;
    use tempfile::tempdir;

    fn create_test_jar(path: &Path) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();

        zip.add_directory("com/example/", options).unwrap();
        zip.start_file("com/example/Test.class", options).unwrap();
        // CAFEBABE header
        zip.write_all(&[0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34])
            .unwrap();
        zip.start_file("config.properties", options).unwrap();
        zip.write_all(b"threads=4\n").unwrap();

        zip.finish().unwrap();
    }

    /// Stored (uncompressed) jar whose bytes can be patched in place.
    fn create_stored_jar(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, payload) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(payload).unwrap();
        }
        zip.finish().unwrap();
    }

    fn patch_all(path: &Path, from: &[u8], to: &[u8]) {
        assert_eq!(from.len(), to.len());
        let mut bytes = std::fs::read(path).unwrap();
        let mut patched = 0;
        let mut i = 0;
        while i + from.len() <= bytes.len() {
            if &bytes[i..i + from.len()] == from {
                bytes[i..i + from.len()].copy_from_slice(to);
                patched += 1;
                i += from.len();
            } else {
                i += 1;
            }
        }
        assert!(patched > 0);
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_reads_entries_in_archive_order() {
        let dir = tempdir().unwrap();
        let jar_path = dir.path().join("test.jar");
        create_test_jar(&jar_path);

        let reader = ArchiveReader::open(&jar_path).unwrap();
        assert_eq!(reader.len(), 3);

        let entries: Vec<Entry> = reader.map(|e| e.unwrap()).collect();
        assert_eq!(entries[0], Entry::directory("com/example/"));
        assert_eq!(entries[1].path, "com/example/Test.class");
        assert_eq!(entries[1].size, 8);
        assert_eq!(entries[2].payload, b"threads=4\n");
    }

    #[test]
    fn test_missing_archive_is_not_found() {
        let dir = tempdir().unwrap();
        let err = ArchiveReader::open(&dir.path().join("absent.jar"))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.jar");
        std::fs::write(&path, b"definitely not a zip file").unwrap();

        let err = ArchiveReader::open(&path).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::CorruptArchive);
        assert!(err.to_string().contains("garbage.jar"));
    }

    #[test]
    fn test_abandoned_reader_releases_handle() {
        let dir = tempdir().unwrap();
        let jar_path = dir.path().join("test.jar");
        create_test_jar(&jar_path);

        {
            let mut reader = ArchiveReader::open(&jar_path).unwrap();
            assert!(reader.next().is_some());
        }
        // The handle is gone, so the file can be replaced and reopened.
        std::fs::remove_file(&jar_path).unwrap();
        create_test_jar(&jar_path);
        assert_eq!(ArchiveReader::open(&jar_path).unwrap().count(), 3);
    }

    #[test]
    fn test_checksum_mismatch_is_corrupt_and_fuses() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("damaged.jar");
        create_stored_jar(
            &path,
            &[
                ("a/first.txt", b"original-payload-0123"),
                ("a/second.txt", b"intact"),
            ],
        );
        patch_all(&path, b"original-payload-0123", b"tampered-payload-0123");

        let mut reader = ArchiveReader::open(&path).unwrap();
        let err = reader.next().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptArchive);
        assert!(err.to_string().contains("a/first.txt"));
        // The intact second entry is never reached.
        assert!(reader.next().is_none());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_truncated_archive_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("truncated.jar");
        create_test_jar(&path);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        let err = ArchiveReader::open(&path).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::CorruptArchive);
    }

    #[test]
    fn test_entry_escaping_root_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("escape.jar");
        create_stored_jar(&path, &[("xx/evil.txt", b"boom"), ("ok.txt", b"fine")]);
        patch_all(&path, b"xx/evil.txt", b"../evil.txt");

        let mut reader = ArchiveReader::open(&path).unwrap();
        let err = reader.next().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptArchive);
        assert!(err.to_string().contains("../evil.txt"));
        assert!(reader.next().is_none());
    }
}
