//! Evaluation record store (evaluator flow).
//!
//! Every operation is a read-modify-write of one `<evaluators_dir>/<username>.json` document,
//! performed while holding that document's lock so concurrent requests for the same evaluator
//! merge instead of overwriting each other. Records must be created explicitly with
//! [`EvaluationStore::create_or_touch`]; every other operation fails with
//! `CoreError::EvaluatorNotFound` for an unknown user.

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::evaluation::{CaseEvaluation, CaseState, EvaluationRecord, EvaluatorScores};
use crate::paths::cases::CaseFolder;
use crate::paths::evaluators::EvaluatorRecordFile;
use crate::progression::CompletionMarkers;
use chrono::{DateTime, Utc};
use medsim_files::{read_json, write_json, DocumentLocks};
use medsim_types::Username;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Result of [`EvaluationStore::create_or_touch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchOutcome {
    pub created: bool,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct EvaluationStore {
    cfg: Arc<CoreConfig>,
    locks: DocumentLocks,
}

impl EvaluationStore {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            cfg,
            locks: DocumentLocks::new(),
        }
    }

    pub fn record_path(&self, username: &Username) -> PathBuf {
        EvaluatorRecordFile::path(self.cfg.evaluators_dir(), username)
    }

    /// Create the record if absent; otherwise refresh `username` and `updated_at` only.
    pub fn create_or_touch(&self, username: &Username) -> CoreResult<TouchOutcome> {
        let path = self.record_path(username);
        self.locks.with_lock(&path, || -> CoreResult<TouchOutcome> {
            let now = Utc::now();
            let (record, created) = match read_json::<EvaluationRecord>(&path)? {
                Some(mut existing) => {
                    existing.username = username.to_string();
                    existing.updated_at = Some(now);
                    (existing, false)
                }
                None => (EvaluationRecord::new(username.as_str(), now), true),
            };
            write_json(&path, &record)?;

            if created {
                tracing::info!("created evaluator record {}", path.display());
            } else {
                tracing::debug!("touched evaluator record {}", path.display());
            }
            Ok(TouchOutcome {
                created,
                path: path.clone(),
            })
        })
    }

    /// Read the whole record.
    pub fn read(&self, username: &Username) -> CoreResult<EvaluationRecord> {
        read_json(&self.record_path(username))?
            .ok_or_else(|| CoreError::EvaluatorNotFound(username.to_string()))
    }

    /// Run `f` against the current record under its lock, stamp `updated_at`, and write back.
    ///
    /// Nothing is written when `f` fails.
    fn modify<R>(
        &self,
        username: &Username,
        f: impl FnOnce(&mut EvaluationRecord, DateTime<Utc>) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let path = self.record_path(username);
        self.locks.with_lock(&path, || -> CoreResult<R> {
            let mut record: EvaluationRecord = read_json(&path)?
                .ok_or_else(|| CoreError::EvaluatorNotFound(username.to_string()))?;
            let now = Utc::now();
            let result = f(&mut record, now)?;
            record.updated_at = Some(now);
            write_json(&path, &record)?;
            Ok(result)
        })
    }

    /// Set one dimension score for one evaluator of one case.
    pub fn upsert_dimension_score(
        &self,
        username: &Username,
        case: &CaseFolder,
        evaluator_id: &str,
        dimension_key: &str,
        score: Value,
    ) -> CoreResult<()> {
        validate_evaluator_id(evaluator_id)?;
        if dimension_key.trim().is_empty() {
            return Err(CoreError::InvalidInput("dimension_key cannot be empty".into()));
        }

        self.modify(username, |record, _| {
            record.upsert_dimension_score(case.name(), evaluator_id, dimension_key, score);
            Ok(())
        })?;
        tracing::debug!("{username}: {case}/{evaluator_id}/{dimension_key} saved");
        Ok(())
    }

    /// Replace a case's `ranking` and `tiers` together.
    pub fn replace_ranking_and_tiers(
        &self,
        username: &Username,
        case: &CaseFolder,
        ranking: Vec<Value>,
        tiers: Map<String, Value>,
    ) -> CoreResult<()> {
        self.modify(username, |record, now| {
            record.replace_ranking_and_tiers(case.name(), ranking, tiers, now);
            Ok(())
        })
    }

    /// Mark a case saved with its ranking and merge the submitted evaluators.
    ///
    /// Returns the number of evaluators merged.
    pub fn merge_case_state(
        &self,
        username: &Username,
        case: &CaseFolder,
        ranking: Vec<Value>,
        submissions: BTreeMap<String, EvaluatorScores>,
    ) -> CoreResult<usize> {
        for evaluator_id in submissions.keys() {
            validate_evaluator_id(evaluator_id)?;
        }

        let count = self.modify(username, |record, now| {
            Ok(record.merge_case_state(case.name(), ranking, submissions, now))
        })?;
        tracing::info!("{username}: {case} saved with {count} evaluators");
        Ok(count)
    }

    /// Ensure empty `evaluation_results` and `feedback` entries exist for a case.
    pub fn initialize_case_fields(&self, username: &Username, case: &CaseFolder) -> CoreResult<()> {
        self.modify(username, |record, _| {
            record.initialize_case_fields(case.name());
            Ok(())
        })
    }

    pub fn save_feedback(
        &self,
        username: &Username,
        case: &CaseFolder,
        evaluator_id: &str,
        text: String,
    ) -> CoreResult<()> {
        validate_evaluator_id(evaluator_id)?;
        self.modify(username, |record, _| {
            record.save_feedback(case.name(), evaluator_id, text);
            Ok(())
        })
    }

    /// Merge the final submission into the record and stamp `submitted_at`.
    ///
    /// Case keys are normalised to folder names; malformed case ids are rejected before
    /// anything is written.
    pub fn submit(
        &self,
        username: &Username,
        results: BTreeMap<String, CaseEvaluation>,
    ) -> CoreResult<()> {
        let mut normalised: BTreeMap<String, CaseEvaluation> = BTreeMap::new();
        for (case_id, evaluation) in results {
            let folder = CaseFolder::from_case_id(&case_id)
                .ok_or_else(|| CoreError::InvalidInput(format!("invalid case id '{case_id}'")))?;
            for evaluator_id in evaluation.evaluators().keys() {
                validate_evaluator_id(evaluator_id)?;
            }
            match normalised.get_mut(folder.name()) {
                Some(existing) => CaseEvaluation::merge_from(existing, evaluation),
                None => {
                    normalised.insert(folder.name().to_owned(), evaluation);
                }
            }
        }

        let cases = normalised.len();
        self.modify(username, |record, now| {
            record.merge_submission(normalised, now);
            Ok(())
        })?;
        tracing::info!("{username}: submitted evaluation covering {cases} cases");
        Ok(())
    }

    pub fn read_case_state(&self, username: &Username, case: &CaseFolder) -> CoreResult<CaseState> {
        Ok(self.read(username)?.case_state(case.name()))
    }
}

impl CompletionMarkers for EvaluationRecord {
    fn is_complete(&self, folder: &CaseFolder, _username: &Username) -> bool {
        self.is_case_saved(folder.name())
    }
}

fn validate_evaluator_id(evaluator_id: &str) -> CoreResult<()> {
    if evaluator_id.trim().is_empty() {
        return Err(CoreError::InvalidInput("evaluator_id cannot be empty".into()));
    }
    if CaseEvaluation::is_metadata_key(evaluator_id) {
        return Err(CoreError::InvalidInput(format!(
            "'{evaluator_id}' is reserved and cannot be used as an evaluator id"
        )));
    }
    Ok(())
}
