//! Conversation store (analyst flow).
//!
//! Each analyst's transcript for a case is stored as `case<N>/<username>.json` next to the case
//! document. The file is overwritten whole on every save, and its existence is what marks the
//! case as done for that user. Recorded model conversations live in the same folders under
//! their own names (`LLM1.json`, ...) and are read back by the evaluator flow.

use crate::config::CoreConfig;
use crate::constants::{JSON_EXTENSION, MODEL_OUTPUT_PREFIX};
use crate::error::{CoreError, CoreResult};
use crate::paths::cases::CaseFolder;
use crate::progression::CompletionMarkers;
use crate::repositories::catalog::CaseCatalog;
use medsim_files::{list_dir, read_json, write_json, DirEntryKind, DocumentLocks};
use medsim_types::Username;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// A saved transcript plus the user's conclusions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Turns as sent by the client, system messages already removed.
    #[serde(default)]
    pub conversation: Vec<Value>,
    #[serde(rename = "Diagnosis", alias = "diagnosis", default)]
    pub diagnosis: String,
    #[serde(rename = "Treatment", alias = "treatment", default)]
    pub treatment: String,
}

impl ConversationRecord {
    /// Text of the first turn, if it has one.
    pub fn first_turn_text(&self) -> Option<&str> {
        self.conversation
            .first()
            .and_then(|turn| turn.get("content"))
            .and_then(Value::as_str)
    }
}

/// Any JSON document found in a case folder other than the case document itself.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedConversation {
    /// File stem, used as the evaluator id.
    pub id: String,
    pub file: String,
    pub data: Value,
}

#[derive(Debug)]
pub struct ConversationStore {
    cfg: Arc<CoreConfig>,
    catalog: Arc<CaseCatalog>,
    locks: DocumentLocks,
}

impl ConversationStore {
    pub fn new(cfg: Arc<CoreConfig>, catalog: Arc<CaseCatalog>) -> Self {
        Self {
            cfg,
            catalog,
            locks: DocumentLocks::new(),
        }
    }

    /// Path of `username`'s transcript in `folder`.
    ///
    /// A username equal to the folder name would address the case document itself and is
    /// rejected with `CoreError::InvalidInput`.
    fn user_record_file(&self, folder: &CaseFolder, username: &Username) -> CoreResult<PathBuf> {
        if username.as_str() == folder.name() {
            return Err(CoreError::InvalidInput(format!(
                "'{username}' is reserved for the case document of {folder}"
            )));
        }
        Ok(folder.record_file(self.cfg.conversations_dir(), username))
    }

    /// Save `record` as `username`'s transcript for the case at `case_index`.
    ///
    /// Always writes, even when the record is empty; the file is the completion marker. An
    /// index outside the catalog falls back to the folder `case<case_index + 1>`, which is
    /// created if needed.
    ///
    /// # Returns
    ///
    /// The path written.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Persistence` with the failing path and operation if the write fails.
    pub fn save(
        &self,
        username: &Username,
        case_index: usize,
        record: &ConversationRecord,
    ) -> CoreResult<PathBuf> {
        let folder = self.catalog.folder_for(case_index);
        let path = self.user_record_file(&folder, username)?;
        if self.catalog.get(case_index).is_none() {
            tracing::warn!(
                "saving {username} for index {case_index} outside the catalog into {folder}"
            );
        }

        self.locks
            .with_lock(&path, || write_json(&path, record))?;

        tracing::info!(
            "saved conversation for {username} at {} ({} turns)",
            path.display(),
            record.conversation.len()
        );
        Ok(path)
    }

    /// Load `username`'s saved transcript for the case at `case_index`.
    ///
    /// Only the exact file `<username>.json` is considered.
    ///
    /// # Returns
    ///
    /// `Ok(None)` if the user has not saved this case yet.
    ///
    /// # Errors
    ///
    /// `CoreError::CaseNotFound` if `case_index` is outside the catalog; `CoreError::Persistence`
    /// if the file exists but cannot be read.
    pub fn load(
        &self,
        username: &Username,
        case_index: usize,
    ) -> CoreResult<Option<ConversationRecord>> {
        let descriptor = self
            .catalog
            .get(case_index)
            .ok_or_else(|| CoreError::CaseNotFound(format!("index {case_index}")))?;

        let path = self.user_record_file(&descriptor.folder, username)?;
        Ok(read_json(&path)?)
    }

    /// Whether `username` has a saved transcript in `folder`.
    ///
    /// The case document never counts as a transcript.
    pub fn has_record(&self, folder: &CaseFolder, username: &Username) -> bool {
        self.user_record_file(folder, username)
            .is_ok_and(|path| path.is_file())
    }

    /// Recorded conversation `<owner>.json` in `folder`.
    ///
    /// The case document itself is never returned through this call.
    pub fn model_output(
        &self,
        folder: &CaseFolder,
        owner: &Username,
    ) -> CoreResult<Option<ConversationRecord>> {
        if owner.as_str() == folder.name() {
            return Ok(None);
        }
        let path = folder.record_file(self.cfg.conversations_dir(), owner);
        Ok(read_json(&path)?)
    }

    /// Every recorded conversation in `folder`, sorted by file name.
    ///
    /// Files that cannot be parsed are logged and skipped.
    ///
    /// # Errors
    ///
    /// `CoreError::CaseNotFound` if the folder does not exist.
    pub fn case_evaluators(&self, folder: &CaseFolder) -> CoreResult<Vec<RecordedConversation>> {
        let dir = folder.dir(self.cfg.conversations_dir());
        if !dir.is_dir() {
            return Err(CoreError::CaseNotFound(folder.name().to_owned()));
        }

        let case_file = folder.content_file_name();
        let mut recorded = Vec::new();

        for entry in list_dir(&dir)? {
            if entry.kind != DirEntryKind::File
                || entry.name.starts_with('.')
                || entry.name == case_file
            {
                continue;
            }
            let Some(stem) = entry.name.strip_suffix(JSON_EXTENSION) else {
                continue;
            };

            let path = dir.join(&entry.name);
            match read_json::<Value>(&path) {
                Ok(Some(data)) => recorded.push(RecordedConversation {
                    id: stem.to_owned(),
                    file: entry.name.clone(),
                    data,
                }),
                Ok(None) => {}
                Err(e) => tracing::warn!("skipping recorded conversation: {e}"),
            }
        }

        tracing::debug!("{folder}: {} recorded conversations", recorded.len());
        Ok(recorded)
    }

    /// Whether `folder` holds at least one model output (`LLM*.json`).
    pub fn has_model_outputs(&self, folder: &CaseFolder) -> bool {
        let dir = folder.dir(self.cfg.conversations_dir());
        match list_dir(&dir) {
            Ok(entries) => entries.iter().any(|entry| {
                entry.kind == DirEntryKind::File
                    && entry.name.starts_with(MODEL_OUTPUT_PREFIX)
                    && entry.name.ends_with(JSON_EXTENSION)
            }),
            Err(_) => false,
        }
    }
}

impl CompletionMarkers for ConversationStore {
    fn is_complete(&self, folder: &CaseFolder, username: &Username) -> bool {
        self.has_record(folder, username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progression::next_incomplete_index;
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn store_with_cases(root: &Path, cases: &[&str]) -> ConversationStore {
        for name in cases {
            let dir = root.join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(format!("{name}.json")), r#"{"main_suit": "cough"}"#).unwrap();
        }
        let cfg = Arc::new(CoreConfig::new(root.to_path_buf(), root.join("evaluators")));
        let catalog = Arc::new(CaseCatalog::new(cfg.clone()));
        ConversationStore::new(cfg, catalog)
    }

    fn user(name: &str) -> Username {
        Username::parse(name).unwrap()
    }

    #[test]
    fn test_save_writes_expected_document() {
        let temp = TempDir::new().unwrap();
        let store = store_with_cases(temp.path(), &["case1"]);
        let record = ConversationRecord {
            conversation: vec![json!({"role": "user", "content": "I have a cough"})],
            diagnosis: "Bronchitis".into(),
            treatment: "Rest".into(),
        };

        let path = store.save(&user("alice"), 0, &record).unwrap();

        assert_eq!(path, temp.path().join("case1").join("alice.json"));
        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            raw,
            json!({
                "conversation": [{"role": "user", "content": "I have a cough"}],
                "Diagnosis": "Bronchitis",
                "Treatment": "Rest"
            })
        );
    }

    #[test]
    fn test_empty_save_still_marks_case_complete() {
        let temp = TempDir::new().unwrap();
        let store = store_with_cases(temp.path(), &["case1", "case2"]);
        let alice = user("alice");

        store
            .save(&alice, 0, &ConversationRecord::default())
            .unwrap();

        assert!(temp.path().join("case1").join("alice.json").is_file());
        let next = next_incomplete_index(store.catalog.list_cases(), &store, &alice);
        assert_eq!(next.index, 1);
    }

    #[test]
    fn test_save_out_of_range_uses_synthesized_folder() {
        let temp = TempDir::new().unwrap();
        let store = store_with_cases(temp.path(), &["case1"]);

        let path = store
            .save(&user("bob"), 4, &ConversationRecord::default())
            .unwrap();

        assert_eq!(path, temp.path().join("case5").join("bob.json"));
        assert!(path.is_file());
    }

    #[test]
    fn test_save_overwrites_previous_record() {
        let temp = TempDir::new().unwrap();
        let store = store_with_cases(temp.path(), &["case1"]);
        let alice = user("alice");

        let first = ConversationRecord {
            diagnosis: "first".into(),
            ..Default::default()
        };
        let second = ConversationRecord {
            treatment: "second".into(),
            ..Default::default()
        };
        store.save(&alice, 0, &first).unwrap();
        store.save(&alice, 0, &second).unwrap();

        let loaded = store.load(&alice, 0).unwrap().unwrap();
        assert_eq!(loaded, second);
    }

    #[test]
    fn test_load_matches_exact_filename_only() {
        let temp = TempDir::new().unwrap();
        let store = store_with_cases(temp.path(), &["case1"]);
        let dir = temp.path().join("case1");
        fs::write(dir.join("modelX.json"), r#"{"Diagnosis": "model"}"#).unwrap();
        fs::write(dir.join("alice_old.json"), r#"{"Diagnosis": "old"}"#).unwrap();

        assert!(store.load(&user("alice"), 0).unwrap().is_none());

        fs::write(dir.join("alice.json"), r#"{"Diagnosis": "mine"}"#).unwrap();
        let record = store.load(&user("alice"), 0).unwrap().unwrap();
        assert_eq!(record.diagnosis, "mine");
        assert!(!store.has_record(
            &CaseFolder::parse("case1").unwrap(),
            &user("model")
        ));
    }

    #[test]
    fn test_load_out_of_range_is_case_not_found() {
        let temp = TempDir::new().unwrap();
        let store = store_with_cases(temp.path(), &["case1"]);
        let err = store.load(&user("alice"), 3).unwrap_err();
        assert!(matches!(err, CoreError::CaseNotFound(_)));
    }

    #[test]
    fn test_case_evaluators_lists_records_and_skips_broken_files() {
        let temp = TempDir::new().unwrap();
        let store = store_with_cases(temp.path(), &["case2"]);
        let dir = temp.path().join("case2");
        fs::write(dir.join("LLM1.json"), r#"{"conversation": []}"#).unwrap();
        fs::write(dir.join("alice.json"), r#"{"conversation": []}"#).unwrap();
        fs::write(dir.join("broken.json"), "{").unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let folder = CaseFolder::parse("case2").unwrap();
        let ids: Vec<_> = store
            .case_evaluators(&folder)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();

        assert_eq!(ids, vec!["LLM1", "alice"]);
        assert!(store.has_model_outputs(&folder));
    }

    #[test]
    fn test_case_evaluators_missing_folder() {
        let temp = TempDir::new().unwrap();
        let store = store_with_cases(temp.path(), &["case1"]);
        let err = store
            .case_evaluators(&CaseFolder::parse("case9").unwrap())
            .unwrap_err();
        assert!(matches!(err, CoreError::CaseNotFound(_)));
    }

    #[test]
    fn test_username_equal_to_case_folder_never_touches_case_document() {
        let temp = TempDir::new().unwrap();
        let store = store_with_cases(temp.path(), &["case1", "case2"]);
        let case_file = temp.path().join("case1").join("case1.json");
        let before = fs::read_to_string(&case_file).unwrap();
        let case1 = user("case1");

        let next = next_incomplete_index(store.catalog.list_cases(), &store, &case1);
        assert_eq!(next.index, 0);
        assert!(!next.all_complete);

        let err = store.load(&case1, 0).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));

        let err = store
            .save(&case1, 0, &ConversationRecord::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
        assert_eq!(fs::read_to_string(&case_file).unwrap(), before);

        // Another case's folder name is an ordinary username here.
        store
            .save(&user("case2"), 0, &ConversationRecord::default())
            .unwrap();
        assert!(temp.path().join("case1").join("case2.json").is_file());
    }

    #[test]
    fn test_model_output_reads_exact_file_and_never_the_case_document() {
        let temp = TempDir::new().unwrap();
        let store = store_with_cases(temp.path(), &["case1"]);
        let dir = temp.path().join("case1");
        fs::write(
            dir.join("LLM2.json"),
            r#"{"conversation": [{"role": "user", "content": "hi"}], "Diagnosis": "flu"}"#,
        )
        .unwrap();

        let folder = CaseFolder::parse("case1").unwrap();
        let record = store.model_output(&folder, &user("LLM2")).unwrap().unwrap();
        assert_eq!(record.diagnosis, "flu");
        assert_eq!(record.first_turn_text(), Some("hi"));

        assert!(store.model_output(&folder, &user("case1")).unwrap().is_none());
        assert!(store.model_output(&folder, &user("LLM")).unwrap().is_none());
    }
}
