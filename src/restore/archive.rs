// grafanatool/src/restore/archive.rs
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use tar::Archive;
use tempfile::{Builder as TempFileBuilder, TempDir};

use crate::errors::{RestoreError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const WORKSPACE_PREFIX: &str = "grafana_restore_";

/// Where the backup archive comes from.
#[derive(Debug, Clone)]
pub enum ArchiveSource {
    LocalPath(PathBuf),
    /// Archive bytes already downloaded from remote storage, with the name they were fetched under.
    Bytes { name: String, data: Vec<u8> },
}

impl ArchiveSource {
    fn describe(&self) -> String {
        match self {
            ArchiveSource::LocalPath(path) => path.display().to_string(),
            ArchiveSource::Bytes { name, .. } => name.clone(),
        }
    }

    fn reader(&self) -> std::io::Result<Box<dyn Read + '_>> {
        Ok(match self {
            ArchiveSource::LocalPath(path) => Box::new(File::open(path)?),
            ArchiveSource::Bytes { data, .. } => Box::new(Cursor::new(data.as_slice())),
        })
    }
}

/// Temporary directory holding one extracted archive. It belongs to a single restore run and
/// is removed when dropped; `close` does the same but reports a removal failure as a warning.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => println!("✓ Removed temporary workspace {}", path.display()),
            Err(e) => eprintln!(
                "⚠️ Failed to remove temporary workspace {}: {}",
                path.display(),
                e
            ),
        }
    }
}

/// Validates `source` as a gzip-compressed tar archive and extracts it into a fresh,
/// uniquely named temporary workspace.
pub fn open_archive(source: &ArchiveSource) -> Result<Workspace> {
    let archive_name = source.describe();
    let unreadable = |reason: String| RestoreError::ArchiveUnreadable {
        archive: archive_name.clone(),
        reason,
    };

    let entry_count = validate_archive(source).map_err(unreadable)?;
    println!("✓ Archive {} is valid ({} entries)", archive_name, entry_count);

    let dir = TempFileBuilder::new().prefix(WORKSPACE_PREFIX).tempdir()?;
    let workspace = Workspace { dir };

    println!(
        "Extracting tar.gz archive {} to {}",
        archive_name,
        workspace.path().display()
    );
    let reader = source
        .reader()
        .map_err(|e| unreadable(format!("failed to reopen archive: {}", e)))?;
    let mut archive = Archive::new(GzDecoder::new(reader));
    // Entries with absolute paths or `..` components are never written outside the workspace.
    archive
        .unpack(workspace.path())
        .map_err(|e| RestoreError::Extraction {
            workspace: workspace.path().to_path_buf(),
            reason: e.to_string(),
        })?;

    println!("✓ Tar.gz archive extracted successfully to {}", workspace.path().display());
    Ok(workspace)
}

/// Reads every entry header of the archive, returning the entry count.
fn validate_archive(source: &ArchiveSource) -> std::result::Result<usize, String> {
    let mut reader = source
        .reader()
        .map_err(|e| format!("failed to open archive: {}", e))?;

    let mut magic = [0u8; 2];
    reader
        .read_exact(&mut magic)
        .map_err(|_| "file is too short to be a gzip archive".to_string())?;
    if magic != GZIP_MAGIC {
        return Err("missing gzip header".to_string());
    }

    let mut decoded = BufReader::new(GzDecoder::new(Cursor::new(magic).chain(reader)));
    let has_content = !decoded
        .fill_buf()
        .map_err(|e| format!("corrupt gzip stream: {}", e))?
        .is_empty();
    if !has_content {
        return Err("empty archive".to_string());
    }

    let mut archive = Archive::new(decoded);
    let entries = archive
        .entries()
        .map_err(|e| format!("failed to read tar entries: {}", e))?;

    let mut count = 0;
    for entry in entries {
        let entry = entry.map_err(|e| format!("corrupt tar entry: {}", e))?;
        entry
            .path()
            .map_err(|e| format!("invalid path in archive entry: {}", e))?;
        count += 1;
    }
    Ok(count)
}

/// Builds a `.tar.gz` holding `files` (relative path, contents); test fixture helper.
#[cfg(test)]
pub(crate) fn build_test_archive(files: &[(&str, &str)]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::GzEncoder;

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut tar_builder = tar::Builder::new(encoder);
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar_builder
            .append_data(&mut header, name, contents.as_bytes())
            .unwrap();
    }
    tar_builder.into_inner().unwrap().finish().unwrap()
}
