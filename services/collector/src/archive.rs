//! Raw data folder housekeeping: make sure both folders exist and move
//! previous extracts out of the way before a new one is written.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::CollectError;

fn fs_error(path: &Path) -> impl FnOnce(std::io::Error) -> CollectError + '_ {
    move |source| {
        error!(path = %path.display(), error = %source, "Filesystem operation failed");
        CollectError::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub fn create_folders_if_missing(paths: &[&Path]) -> Result<(), CollectError> {
    for path in paths {
        if path.exists() {
            continue;
        }
        fs::create_dir_all(path).map_err(fs_error(path))?;
        info!(path = %path.display(), "Created directory");
    }
    Ok(())
}

/// Move every entry of `source_dir` into `target_dir`. Returns the moved paths.
///
/// Files fall back to copy + remove when a rename is refused (for example
/// when the archive sits on another filesystem).
pub fn archive_old_files(source_dir: &Path, target_dir: &Path) -> Result<Vec<PathBuf>, CollectError> {
    let entries = fs::read_dir(source_dir).map_err(fs_error(source_dir))?;

    let mut moved = Vec::new();
    for entry in entries {
        let entry = entry.map_err(fs_error(source_dir))?;
        let from = entry.path();
        let to = target_dir.join(entry.file_name());

        if fs::rename(&from, &to).is_err() {
            if !from.is_file() {
                return Err(fs_error(&from)(std::io::Error::other("cannot move directory")));
            }
            fs::copy(&from, &to).map_err(fs_error(&to))?;
            fs::remove_file(&from).map_err(fs_error(&from))?;
        }
        info!(from = %from.display(), to = %to.display(), "Archived raw file");
        moved.push(to);
    }
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_folders_if_missing() {
        let root = tempdir().unwrap();
        let raw = root.path().join("raw_data");
        let archive = root.path().join("nested").join("archive");

        create_folders_if_missing(&[raw.as_path(), archive.as_path()]).unwrap();
        assert!(raw.is_dir());
        assert!(archive.is_dir());

        // second call is a no-op
        create_folders_if_missing(&[raw.as_path(), archive.as_path()]).unwrap();
    }

    #[test]
    fn test_archive_moves_every_file() {
        let root = tempdir().unwrap();
        let raw = root.path().join("raw");
        let archive = root.path().join("archive");
        create_folders_if_missing(&[raw.as_path(), archive.as_path()]).unwrap();

        fs::write(raw.join("top50movies20240101-000000.csv.gz"), b"a").unwrap();
        fs::write(raw.join("notes.txt"), b"b").unwrap();

        let mut moved = archive_old_files(&raw, &archive).unwrap();
        moved.sort();

        assert_eq!(moved.len(), 2);
        assert_eq!(fs::read_dir(&raw).unwrap().count(), 0);
        assert_eq!(fs::read(archive.join("notes.txt")).unwrap(), b"b");
        assert!(archive.join("top50movies20240101-000000.csv.gz").is_file());
    }

    #[test]
    fn test_archive_empty_source() {
        let root = tempdir().unwrap();
        let raw = root.path().join("raw");
        let archive = root.path().join("archive");
        create_folders_if_missing(&[raw.as_path(), archive.as_path()]).unwrap();

        assert!(archive_old_files(&raw, &archive).unwrap().is_empty());
    }

    #[test]
    fn test_archive_missing_source_is_filesystem_error() {
        let root = tempdir().unwrap();
        let err = archive_old_files(&root.path().join("nope"), root.path()).unwrap_err();
        assert!(matches!(err, CollectError::Filesystem { .. }));
    }
}
