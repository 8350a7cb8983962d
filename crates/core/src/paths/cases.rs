//! Case folder naming.
//!
//! ```text
//! <conversations_dir>/
//!   case<N>/
//!     case<N>.json     # case document
//!     <owner>.json     # conversation record of a user or a model
//! ```
//!
//! `N` is a positive integer written without leading zeros.

use crate::constants::{CASE_FOLDER_PREFIX, JSON_EXTENSION};
use medsim_types::Username;
use std::path::{Path, PathBuf};

/// A validated `case<N>` folder name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaseFolder {
    number: u32,
    name: String,
}

impl CaseFolder {
    /// Parse a directory name of the form `case<N>`.
    ///
    /// Returns `None` for anything else, including `case0`, `case07` and `case-1`.
    pub fn parse(name: &str) -> Option<Self> {
        let digits = name.strip_prefix(CASE_FOLDER_PREFIX)?;
        if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        let number = digits.parse::<u32>().ok()?;
        Some(Self {
            number,
            name: name.to_owned(),
        })
    }

    pub fn from_number(number: u32) -> Option<Self> {
        (number > 0).then(|| Self {
            number,
            name: format!("{CASE_FOLDER_PREFIX}{number}"),
        })
    }

    /// Folder name used when a catalog index has no descriptor (`case<index + 1>`).
    pub fn synthesized(index: usize) -> Self {
        let number = u32::try_from(index).map_or(u32::MAX, |i| i.saturating_add(1));
        Self {
            number,
            name: format!("{CASE_FOLDER_PREFIX}{number}"),
        }
    }

    /// Normalise a case id as sent by evaluator clients.
    ///
    /// Accepts `"case7"` or a bare number `"7"`; both yield the folder `case7`.
    pub fn from_case_id(case_id: &str) -> Option<Self> {
        let trimmed = case_id.trim();
        Self::parse(trimmed).or_else(|| {
            if trimmed.bytes().all(|b| b.is_ascii_digit()) {
                trimmed.parse::<u32>().ok().and_then(Self::from_number)
            } else {
                None
            }
        })
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self, conversations_dir: &Path) -> PathBuf {
        conversations_dir.join(&self.name)
    }

    /// File name of the case document, e.g. `case7.json`.
    pub fn content_file_name(&self) -> String {
        format!("{}{JSON_EXTENSION}", self.name)
    }

    pub fn content_file(&self, conversations_dir: &Path) -> PathBuf {
        self.dir(conversations_dir).join(self.content_file_name())
    }

    /// Record written by `owner` (a user or a model) for this case.
    pub fn record_file(&self, conversations_dir: &Path, owner: &Username) -> PathBuf {
        self.dir(conversations_dir).join(owner.json_file_name())
    }
}

impl std::fmt::Display for CaseFolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
