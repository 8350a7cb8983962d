//! Whole-document JSON reads and atomic writes.
//!
//! Documents are rendered as pretty-printed UTF-8 JSON (non-ASCII text is written as-is, not
//! escaped). Writes go through a temporary sibling file followed by a rename so that readers
//! never observe a half-written document.

use crate::{FileOperation, FilesError};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Reads and deserialises a JSON document.
///
/// # Returns
///
/// - `Ok(Some(T))` if the document exists and parses
/// - `Ok(None)` if the document does not exist
///
/// # Errors
///
/// Returns `FilesError::Io` if the file exists but cannot be read, and `FilesError::Parse` if
/// its content does not match `T`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, FilesError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(FilesError::io(FileOperation::Read, path)(e)),
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| FilesError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Serialises `value` and atomically replaces the document at `path`.
///
/// Parent directories are created when missing.
///
/// # Errors
///
/// Returns `FilesError` if serialisation, directory creation, the temp file write, or the final
/// rename fails. On failure the previous document (if any) is left untouched.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), FilesError> {
    let rendered = serde_json::to_string_pretty(value).map_err(|source| FilesError::Serialise {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(FilesError::io(FileOperation::CreateDir, parent))?;
        }
    }

    let tmp_path = temp_path_for(path);
    let write_tmp = || -> std::io::Result<()> {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(rendered.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.sync_all()
    };

    if let Err(e) = write_tmp() {
        let _ = fs::remove_file(&tmp_path);
        return Err(FilesError::io(FileOperation::Write, path)(e));
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(FilesError::io(FileOperation::Rename, path)(e));
    }

    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{file_name}.tmp"))
}

/// Kind of a directory entry as reported by [`list_dir`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirEntryKind {
    File,
    Directory,
    Other,
}

/// A single named entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    pub name: String,
    pub kind: DirEntryKind,
}

/// Lists the entries of a directory, sorted by name.
///
/// Entries whose names are not valid UTF-8 are skipped, as are entries that disappear while
/// the listing is taken.
///
/// # Errors
///
/// Returns `FilesError::Io` (with `ErrorKind::NotFound` as the source when `dir` is missing)
/// if the directory cannot be read.
pub fn list_dir(dir: &Path) -> Result<Vec<DirListing>, FilesError> {
    let entries = fs::read_dir(dir).map_err(FilesError::io(FileOperation::ListDir, dir))?;

    let mut listing = Vec::new();
    for entry in entries.flatten() {
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            tracing::warn!("skipping non UTF-8 entry in {}", dir.display());
            continue;
        };
        let kind = match entry.file_type() {
            Ok(ft) if ft.is_dir() => DirEntryKind::Directory,
            Ok(ft) if ft.is_file() => DirEntryKind::File,
            Ok(_) => DirEntryKind::Other,
            Err(_) => continue,
        };
        listing.push(DirListing { name, kind });
    }

    listing.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(listing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Note {
        title: String,
        score: u8,
    }

    #[test]
    fn test_read_json_missing_is_none() {
        let temp = TempDir::new().unwrap();
        let result: Option<Note> = read_json(&temp.path().join("absent.json")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_write_json_creates_parent_directories() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("case3").join("alice.json");
        let note = Note {
            title: "胸痛".into(),
            score: 4,
        };

        write_json(&path, &note).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("胸痛"), "non-ASCII text should not be escaped");
        let back: Note = read_json(&path).unwrap().unwrap();
        assert_eq!(back, note);
    }

    #[test]
    fn test_write_json_leaves_no_temp_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("doc.json");
        write_json(&path, &serde_json::json!({"a": 1})).unwrap();
        write_json(&path, &serde_json::json!({"a": 2})).unwrap();

        let names: Vec<_> = list_dir(temp.path())
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["doc.json".to_string()]);
    }

    #[test]
    fn test_read_json_reports_parse_errors_with_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = read_json::<Note>(&path).unwrap_err();
        assert!(matches!(err, FilesError::Parse { .. }));
        assert_eq!(err.path(), path.as_path());
    }

    #[test]
    fn test_list_dir_reports_kinds_sorted() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("case2")).unwrap();
        fs::write(temp.path().join("a.json"), "{}").unwrap();

        let listing = list_dir(temp.path()).unwrap();
        assert_eq!(
            listing,
            vec![
                DirListing {
                    name: "a.json".into(),
                    kind: DirEntryKind::File
                },
                DirListing {
                    name: "case2".into(),
                    kind: DirEntryKind::Directory
                },
            ]
        );
    }

    #[test]
    fn test_list_dir_missing_directory_is_io_error() {
        let temp = TempDir::new().unwrap();
        let err = list_dir(&temp.path().join("nope")).unwrap_err();
        match err {
            FilesError::Io {
                operation, source, ..
            } => {
                assert_eq!(operation, FileOperation::ListDir);
                assert_eq!(source.kind(), ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
