//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Request handling never reads process-wide environment variables;
//! binaries build these values and hand them down.

use crate::constants::{
    DEFAULT_CONVERSATIONS_DIR, DEFAULT_EVALUATORS_DIR, EVALUATION_DIMENSIONS_FILENAME,
};
use crate::error::CoreResult;
use medsim_files::{FileOperation, FilesError};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    conversations_dir: PathBuf,
    evaluators_dir: PathBuf,
}

impl CoreConfig {
    pub fn new(conversations_dir: PathBuf, evaluators_dir: PathBuf) -> Self {
        Self {
            conversations_dir,
            evaluators_dir,
        }
    }

    /// Build from optional overrides, falling back to the relative default directories.
    pub fn from_overrides(
        conversations_dir: Option<PathBuf>,
        evaluators_dir: Option<PathBuf>,
    ) -> Self {
        Self::new(
            conversations_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_CONVERSATIONS_DIR)),
            evaluators_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_EVALUATORS_DIR)),
        )
    }

    /// Root holding the `case<N>/` folders.
    pub fn conversations_dir(&self) -> &Path {
        &self.conversations_dir
    }

    /// Root holding one `<username>.json` evaluation record per evaluator.
    pub fn evaluators_dir(&self) -> &Path {
        &self.evaluators_dir
    }

    pub fn dimensions_file(&self) -> PathBuf {
        self.conversations_dir.join(EVALUATION_DIMENSIONS_FILENAME)
    }

    /// Create both storage roots if they are missing.
    pub fn ensure_directories(&self) -> CoreResult<()> {
        for dir in [&self.conversations_dir, &self.evaluators_dir] {
            std::fs::create_dir_all(dir).map_err(|source| FilesError::Io {
                operation: FileOperation::CreateDir,
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Settings for the external chat-completion collaborator.
///
/// Every field is optional so that a process with missing settings can still boot in degraded
/// mode. Use [`LlmSettings::missing`] to report what is absent.
#[derive(Clone, Default)]
pub struct LlmSettings {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl LlmSettings {
    pub const MODEL_VAR: &'static str = "OPENAI_MODEL";
    pub const BASE_URL_VAR: &'static str = "OPENAI_BASE_URL";
    pub const API_KEY_VAR: &'static str = "OPENAI_API_KEY";

    /// Names of the required settings that are absent or blank.
    pub fn missing(&self) -> Vec<&'static str> {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());

        let mut missing = Vec::new();
        if blank(&self.model) {
            missing.push(Self::MODEL_VAR);
        }
        if blank(&self.api_key) {
            missing.push(Self::API_KEY_VAR);
        }
        if blank(&self.base_url) {
            missing.push(Self::BASE_URL_VAR);
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<set>"))
            .finish()
    }
}
