//! Case catalog.
//!
//! Discovers the `case<N>` folders under the conversations root and orders them by `N`. The
//! catalog is scanned once, on first access, and then kept for the lifetime of the process;
//! folders added later are only picked up after a restart.

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::paths::cases::CaseFolder;
use medsim_files::{list_dir, DirEntryKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// One case of the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseDescriptor {
    /// Zero-based position in catalog order.
    pub index: usize,
    pub folder: CaseFolder,
    pub content_path: PathBuf,
}

#[derive(Debug)]
pub struct CaseCatalog {
    cfg: Arc<CoreConfig>,
    cases: OnceLock<Vec<CaseDescriptor>>,
}

impl CaseCatalog {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            cfg,
            cases: OnceLock::new(),
        }
    }

    /// Scan `conversations_dir` for case folders, sorted numerically.
    ///
    /// Entries that are not directories, or whose names are not `case<N>`, are ignored.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::CatalogUnavailable` if the root directory does not exist, or
    /// `CoreError::Persistence` if it cannot be listed.
    pub fn scan(conversations_dir: &Path) -> CoreResult<Vec<CaseDescriptor>> {
        if !conversations_dir.is_dir() {
            return Err(CoreError::CatalogUnavailable {
                path: conversations_dir.to_path_buf(),
            });
        }

        let mut folders: Vec<CaseFolder> = list_dir(conversations_dir)?
            .into_iter()
            .filter(|entry| entry.kind == DirEntryKind::Directory)
            .filter_map(|entry| CaseFolder::parse(&entry.name))
            .collect();

        folders.sort_by_key(CaseFolder::number);

        Ok(folders
            .into_iter()
            .enumerate()
            .map(|(index, folder)| CaseDescriptor {
                index,
                content_path: folder.content_file(conversations_dir),
                folder,
            })
            .collect())
    }

    /// Ordered case list, built on first call.
    ///
    /// A missing or unreadable root is logged and treated as an empty catalog.
    pub fn list_cases(&self) -> &[CaseDescriptor] {
        self.cases.get_or_init(|| {
            let root = self.cfg.conversations_dir();
            match Self::scan(root) {
                Ok(cases) => {
                    tracing::info!(
                        "case catalog built from {}: {} cases",
                        root.display(),
                        cases.len()
                    );
                    cases
                }
                Err(e) => {
                    tracing::warn!("{e}; treating catalog as empty");
                    Vec::new()
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.list_cases().len()
    }

    pub fn is_empty(&self) -> bool {
        self.list_cases().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CaseDescriptor> {
        self.list_cases().get(index)
    }

    /// Folder for `index`, or the synthesized `case<index + 1>` name when out of range.
    pub fn folder_for(&self, index: usize) -> CaseFolder {
        match self.get(index) {
            Some(descriptor) => descriptor.folder.clone(),
            None => CaseFolder::synthesized(index),
        }
    }

    /// Folder names in catalog order.
    pub fn folder_names(&self) -> Vec<String> {
        self.list_cases()
            .iter()
            .map(|d| d.folder.name().to_owned())
            .collect()
    }
}
