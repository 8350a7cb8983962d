//! medsim File Storage
//!
//! This crate provides the on-disk primitives every medsim store is built on: reading and
//! writing whole JSON documents, listing directories, and serialising read-modify-write cycles
//! on a single document.
//!
//! ## Design Principles
//!
//! - Every document is read and written whole; there are no partial file updates
//! - Writes are atomic: content goes to a sibling temp file which is then renamed into place
//! - A missing document is a normal outcome (`Ok(None)`), not an error
//! - Every error carries the operation and path that failed
//! - Locks are per document; no lock ever spans more than one file
//!
//! ## Example Usage
//!
//! ```no_run
//! use medsim_files::{read_json, write_json, DocumentLocks};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), medsim_files::FilesError> {
//! let locks = DocumentLocks::default();
//! let path = Path::new("evaluators/alice.json");
//!
//! locks.with_lock(path, || {
//!     let mut doc: serde_json::Value = read_json(path)?.unwrap_or_default();
//!     doc["touched"] = serde_json::Value::Bool(true);
//!     write_json(path, &doc)
//! })?;
//! # Ok(())
//! # }
//! ```

mod documents;
mod locks;

pub use documents::{list_dir, read_json, write_json, DirEntryKind, DirListing};
pub use locks::DocumentLocks;

use std::path::PathBuf;

/// The filesystem operation that was in progress when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Read,
    Write,
    CreateDir,
    ListDir,
    Rename,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self {
            FileOperation::Read => "read",
            FileOperation::Write => "write",
            FileOperation::CreateDir => "create directory",
            FileOperation::ListDir => "list directory",
            FileOperation::Rename => "rename into",
        };
        f.write_str(verb)
    }
}

/// Errors that can occur during document operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// I/O error, with the operation and path that failed
    #[error("failed to {operation} {}: {source}", path.display())]
    Io {
        operation: FileOperation,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document exists but is not valid JSON for the expected shape
    #[error("failed to parse JSON document {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The value could not be rendered as JSON
    #[error("failed to serialise JSON document {}: {source}", path.display())]
    Serialise {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl FilesError {
    pub(crate) fn io(operation: FileOperation, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| FilesError::Io {
            operation,
            path,
            source,
        }
    }

    /// Path of the document or directory involved in the failure.
    pub fn path(&self) -> &std::path::Path {
        match self {
            FilesError::Io { path, .. }
            | FilesError::Parse { path, .. }
            | FilesError::Serialise { path, .. } => path,
        }
    }
}
