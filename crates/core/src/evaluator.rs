//! Evaluator flow.
//!
//! Evaluators step through the same cases as analysts, read the recorded model conversations
//! for each one, and score them. Everything they produce lives in one evaluation record per
//! evaluator (see [`crate::repositories::evaluations`]).
//!
//! Case ids arrive from clients as `"case7"` or `"7"`; every operation here normalises them to
//! the folder name before touching the record.

use crate::context::{AppContext, CurrentCase, InitOutcome};
use crate::dimensions::{load_dimensions, Dimension};
use crate::error::{CoreError, CoreResult};
use crate::evaluation::{CaseEvaluation, CaseState, EvaluationRecord, EvaluatorScores, RankingAndTiers};
use crate::paths::cases::CaseFolder;
use crate::progression::next_incomplete_index;
use crate::repositories::cases::ReferenceAnswer;
use crate::repositories::conversations::{ConversationRecord, RecordedConversation};
use crate::repositories::evaluations::TouchOutcome;
use chrono::Utc;
use medsim_types::Username;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Previous,
}

impl Direction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "next" => Some(Direction::Next),
            "previous" => Some(Direction::Previous),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Navigation {
    pub direction: Direction,
    pub previous_index: usize,
    pub current_index: usize,
    pub total_cases: usize,
    pub case_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubmissionEligibility {
    pub can_submit: bool,
    pub completed_cases: usize,
    pub total_cases: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluatorHealth {
    pub active_users: usize,
    pub total_cases: usize,
    pub case_files: Vec<String>,
    pub conversations_dir: PathBuf,
}

/// Parse a client case id (`"case7"` or `"7"`) into its folder.
pub fn parse_case_id(case_id: &str) -> CoreResult<CaseFolder> {
    CaseFolder::from_case_id(case_id.trim())
        .ok_or_else(|| CoreError::InvalidInput(format!("invalid case id '{case_id}'")))
}

pub struct EvaluatorService<'a> {
    ctx: &'a AppContext,
}

impl<'a> EvaluatorService<'a> {
    pub fn new(ctx: &'a AppContext) -> Self {
        Self { ctx }
    }

    // ========================================================================
    // SESSION
    // ========================================================================

    /// Create the evaluator's record, or refresh it if it already exists.
    pub fn create_user(&self, username: &Username) -> CoreResult<TouchOutcome> {
        self.ctx.evaluations().create_or_touch(username)
    }

    /// Place the evaluator on the first case they have not saved or submitted.
    ///
    /// An evaluator without a record starts from the first case.
    pub fn init_user(
        &self,
        username: &Username,
        user_id: Option<String>,
    ) -> CoreResult<InitOutcome> {
        let record = match self.ctx.evaluations().read(username) {
            Ok(record) => record,
            Err(CoreError::EvaluatorNotFound(_)) => {
                tracing::warn!("no evaluation record for {username}; starting from the first case");
                EvaluationRecord::new(username.as_str(), Utc::now())
            }
            Err(e) => return Err(e),
        };

        let next = next_incomplete_index(self.ctx.catalog().list_cases(), &record, username);
        let user_id = user_id.unwrap_or_else(|| username.to_string());
        let sessions = self.ctx.evaluator_sessions();

        let main_complaint = sessions.with_session(username, |state| {
            state.user_id = Some(user_id.clone());
            sessions.navigate(state, next.index);
            state
                .case_content
                .as_ref()
                .and_then(|doc| doc.main_complaint.clone())
        });

        tracing::info!(
            "evaluator {username} initialised on case index {} (all complete: {})",
            next.index,
            next.all_complete
        );

        Ok(InitOutcome {
            username: username.to_string(),
            user_id,
            next,
            total_cases: self.ctx.catalog().len(),
            case_folder: self
                .ctx
                .catalog()
                .get(next.index)
                .map(|d| d.folder.name().to_owned()),
            main_complaint,
        })
    }

    /// Step one case forwards or backwards, regardless of what has been saved.
    ///
    /// # Errors
    ///
    /// - `CoreError::NoCases` if the catalog is empty.
    /// - `CoreError::AtLastCase` / `CoreError::AtFirstCase` at either boundary.
    /// - `CoreError::CaseNotFound` if the target case cannot be loaded; the session keeps its
    ///   previous case in that situation.
    pub fn navigate(&self, username: &Username, direction: Direction) -> CoreResult<Navigation> {
        let total_cases = self.ctx.catalog().len();
        if total_cases == 0 {
            return Err(CoreError::NoCases);
        }

        let sessions = self.ctx.evaluator_sessions();
        sessions.with_session(username, |state| {
            let previous_index = state.current_case_index;
            let current_index = match direction {
                Direction::Next if previous_index + 1 >= total_cases => {
                    return Err(CoreError::AtLastCase)
                }
                Direction::Next => previous_index + 1,
                Direction::Previous => previous_index
                    .checked_sub(1)
                    .ok_or(CoreError::AtFirstCase)?,
            };

            let content = sessions.loader().load_case(current_index).ok_or_else(|| {
                CoreError::CaseNotFound(format!("case {}", current_index + 1))
            })?;
            state.reset_to(current_index, Some(content));
            sessions.initialize(state);

            tracing::info!(
                "evaluator {username} moved from {previous_index} to {current_index} ({direction:?})"
            );

            Ok(Navigation {
                direction,
                previous_index,
                current_index,
                total_cases,
                case_name: self.ctx.catalog().folder_for(current_index).name().to_owned(),
            })
        })
    }

    pub fn current_case(&self, username: &Username) -> CurrentCase {
        let sessions = self.ctx.evaluator_sessions();
        sessions.with_session(username, |state| {
            sessions.initialize(state);
            CurrentCase::snapshot(self.ctx.catalog(), state, true)
        })
    }

    /// # Errors
    ///
    /// `CoreError::CaseNotFound` when the current case has no main complaint.
    pub fn main_complaint(&self, username: &Username) -> CoreResult<String> {
        let sessions = self.ctx.evaluator_sessions();
        sessions.with_session(username, |state| {
            sessions.initialize(state);
            state
                .case_content
                .as_ref()
                .and_then(|doc| doc.main_complaint.clone())
                .ok_or_else(|| {
                    CoreError::CaseNotFound(format!(
                        "main complaint for case index {}",
                        state.current_case_index
                    ))
                })
        })
    }

    /// Reference diagnosis and treatment of the current case.
    ///
    /// `force_refresh` re-reads the case document from disk first.
    pub fn reference_answer(
        &self,
        username: &Username,
        force_refresh: bool,
    ) -> CoreResult<ReferenceAnswer> {
        let sessions = self.ctx.evaluator_sessions();
        sessions.with_session(username, |state| {
            if force_refresh || state.case_content.is_none() {
                if let Some(content) = sessions.loader().load_case(state.current_case_index) {
                    state.case_content = Some(content);
                }
            }
            state
                .case_content
                .as_ref()
                .map(|doc| doc.reference_answer())
                .ok_or_else(|| {
                    CoreError::CaseNotFound(format!("case index {}", state.current_case_index))
                })
        })
    }

    // ========================================================================
    // EVALUATION RECORD
    // ========================================================================

    pub fn submit(
        &self,
        username: &Username,
        results: BTreeMap<String, CaseEvaluation>,
    ) -> CoreResult<()> {
        self.ctx.evaluations().submit(username, results)
    }

    pub fn save_feedback(
        &self,
        username: &Username,
        case_id: &str,
        evaluator_id: &str,
        text: String,
    ) -> CoreResult<()> {
        let case = parse_case_id(case_id)?;
        self.ctx
            .evaluations()
            .save_feedback(username, &case, evaluator_id, text)
    }

    /// The whole evaluation record.
    pub fn results(&self, username: &Username) -> CoreResult<EvaluationRecord> {
        self.ctx.evaluations().read(username)
    }

    pub fn upsert_dimension_score(
        &self,
        username: &Username,
        case_id: &str,
        evaluator_id: &str,
        dimension_key: &str,
        score: Value,
    ) -> CoreResult<()> {
        let case = parse_case_id(case_id)?;
        self.ctx
            .evaluations()
            .upsert_dimension_score(username, &case, evaluator_id, dimension_key, score)
    }

    /// Stored scores for one case, or every case when `case_id` is `None`.
    ///
    /// A case that has nothing stored yields an empty object.
    pub fn scores(&self, username: &Username, case_id: Option<&str>) -> CoreResult<Value> {
        let record = self.ctx.evaluations().read(username)?;
        match case_id {
            Some(case_id) => {
                let case = parse_case_id(case_id)?;
                Ok(record
                    .case(case.name())
                    .map(|evaluation| Value::Object(evaluation.clone().into()))
                    .unwrap_or_else(|| Value::Object(Map::new())))
            }
            None => serde_json::to_value(&record.evaluation_results)
                .map_err(|e| CoreError::InvalidInput(format!("cannot render scores: {e}"))),
        }
    }

    pub fn initialize_case_fields(&self, username: &Username, case_id: &str) -> CoreResult<()> {
        let case = parse_case_id(case_id)?;
        self.ctx.evaluations().initialize_case_fields(username, &case)
    }

    pub fn replace_ranking_and_tiers(
        &self,
        username: &Username,
        case_id: &str,
        ranking: Vec<Value>,
        tiers: Map<String, Value>,
    ) -> CoreResult<()> {
        let case = parse_case_id(case_id)?;
        self.ctx
            .evaluations()
            .replace_ranking_and_tiers(username, &case, ranking, tiers)
    }

    /// Ranking pairs keyed by case id, restricted to one case when `case_id` is given.
    pub fn rankings(
        &self,
        username: &Username,
        case_id: Option<&str>,
    ) -> CoreResult<BTreeMap<String, RankingAndTiers>> {
        let record = self.ctx.evaluations().read(username)?;
        match case_id {
            Some(case_id) => {
                let case = parse_case_id(case_id)?;
                let pair = record
                    .case(case.name())
                    .map(CaseEvaluation::ranking_and_tiers)
                    .unwrap_or_default();
                Ok(BTreeMap::from([(case.name().to_owned(), pair)]))
            }
            None => Ok(record.rankings()),
        }
    }

    pub fn merge_case_state(
        &self,
        username: &Username,
        case_id: &str,
        ranking: Vec<Value>,
        submissions: BTreeMap<String, EvaluatorScores>,
    ) -> CoreResult<usize> {
        let case = parse_case_id(case_id)?;
        self.ctx
            .evaluations()
            .merge_case_state(username, &case, ranking, submissions)
    }

    pub fn read_case_state(&self, username: &Username, case_id: &str) -> CoreResult<CaseState> {
        let case = parse_case_id(case_id)?;
        self.ctx.evaluations().read_case_state(username, &case)
    }

    // ========================================================================
    // RECORDED CONVERSATIONS
    // ========================================================================

    /// The conversation recorded as `<evaluator_id>.json` in a case folder.
    ///
    /// # Errors
    ///
    /// `CoreError::ConversationNotFound` if that file does not exist.
    pub fn model_output(&self, case_id: &str, evaluator_id: &str) -> CoreResult<ConversationRecord> {
        let case = parse_case_id(case_id)?;
        let owner = Username::parse(evaluator_id)?;
        self.ctx
            .conversations()
            .model_output(&case, &owner)?
            .ok_or_else(|| CoreError::ConversationNotFound(format!("{case}/{owner}")))
    }

    pub fn case_evaluators(&self, case_id: &str) -> CoreResult<Vec<RecordedConversation>> {
        let case = parse_case_id(case_id)?;
        self.ctx.conversations().case_evaluators(&case)
    }

    // ========================================================================
    // CATALOG-WIDE
    // ========================================================================

    /// Cases that hold at least one model output, against the catalog size.
    pub fn submission_eligibility(&self) -> SubmissionEligibility {
        let cases = self.ctx.catalog().list_cases();
        let completed_cases = cases
            .iter()
            .filter(|d| self.ctx.conversations().has_model_outputs(&d.folder))
            .count();

        SubmissionEligibility {
            can_submit: completed_cases >= cases.len(),
            completed_cases,
            total_cases: cases.len(),
        }
    }

    pub fn dimensions(&self) -> CoreResult<Vec<Dimension>> {
        load_dimensions(&self.ctx.cfg().dimensions_file())
    }

    pub fn health(&self) -> EvaluatorHealth {
        EvaluatorHealth {
            active_users: self.ctx.evaluator_sessions().active_sessions(),
            total_cases: self.ctx.catalog().len(),
            case_files: self.ctx.catalog().folder_names(),
            conversations_dir: self.ctx.cfg().conversations_dir().to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::reply::UnconfiguredReplyGenerator;
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn seed_cases(root: &Path, count: usize) {
        for i in 1..=count {
            let name = format!("case{i}");
            let dir = root.join(&name);
            fs::create_dir_all(&dir).unwrap();
            let doc = json!({
                "prompt1": "scenario",
                "prompt2": format!("narrative {i}"),
                "prompt3": {"HR": 80},
                "personal_message": "Male, 55",
                "main_suit": format!("complaint {i}"),
                "Reference_Diagnostic": format!("diagnosis {i}"),
                "Reference_Treatment": format!("treatment {i}"),
            });
            fs::write(dir.join(format!("{name}.json")), doc.to_string()).unwrap();
        }
    }

    fn context(root: &Path) -> AppContext {
        let cfg = Arc::new(CoreConfig::new(root.join("conversations"), root.join("evaluators")));
        AppContext::new(cfg, Arc::new(UnconfiguredReplyGenerator::new(["OPENAI_MODEL"])))
    }

    fn bob() -> Username {
        Username::parse("bob").unwrap()
    }

    fn setup(count: usize) -> (TempDir, AppContext) {
        let temp = TempDir::new().unwrap();
        seed_cases(&temp.path().join("conversations"), count);
        let ctx = context(temp.path());
        (temp, ctx)
    }

    #[test]
    fn test_parse_case_id_forms() {
        assert_eq!(parse_case_id("case7").unwrap().name(), "case7");
        assert_eq!(parse_case_id("7").unwrap().name(), "case7");
        assert!(matches!(
            parse_case_id("seven").unwrap_err(),
            CoreError::InvalidInput(_)
        ));
    }

    #[test]
    fn test_init_user_without_record_starts_at_zero() {
        let (_temp, ctx) = setup(3);
        let outcome = ctx.evaluator().init_user(&bob(), None).unwrap();

        assert_eq!(outcome.next.index, 0);
        assert!(!outcome.next.all_complete);
        assert_eq!(outcome.main_complaint.as_deref(), Some("complaint 1"));
    }

    #[test]
    fn test_init_user_skips_saved_cases() {
        let (_temp, ctx) = setup(3);
        let evaluator = ctx.evaluator();
        evaluator.create_user(&bob()).unwrap();
        evaluator
            .merge_case_state(&bob(), "case1", vec![json!("LLM1")], BTreeMap::new())
            .unwrap();

        let outcome = evaluator.init_user(&bob(), None).unwrap();
        assert_eq!(outcome.next.index, 1);
        assert_eq!(outcome.case_folder.as_deref(), Some("case2"));
    }

    #[test]
    fn test_navigate_boundaries() {
        let (_temp, ctx) = setup(2);
        let evaluator = ctx.evaluator();

        assert!(matches!(
            evaluator.navigate(&bob(), Direction::Previous).unwrap_err(),
            CoreError::AtFirstCase
        ));

        let moved = evaluator.navigate(&bob(), Direction::Next).unwrap();
        assert_eq!(moved.previous_index, 0);
        assert_eq!(moved.current_index, 1);
        assert_eq!(moved.case_name, "case2");

        assert!(matches!(
            evaluator.navigate(&bob(), Direction::Next).unwrap_err(),
            CoreError::AtLastCase
        ));
    }

    #[test]
    fn test_navigate_without_cases() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());

        assert!(matches!(
            ctx.evaluator().navigate(&bob(), Direction::Next).unwrap_err(),
            CoreError::NoCases
        ));
    }

    #[test]
    fn test_current_case_includes_main_complaint() {
        let (_temp, ctx) = setup(1);
        let current = ctx.evaluator().current_case(&bob());

        assert_eq!(current.case_folder.as_deref(), Some("case1"));
        assert!(current.formatted_data.contains("Patient Information: Male, 55"));
        assert!(current.formatted_data.contains("Main Complaint: complaint 1"));
    }

    #[test]
    fn test_main_complaint_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("conversations");
        fs::create_dir_all(root.join("case1")).unwrap();
        fs::write(root.join("case1").join("case1.json"), r#"{"prompt1": "x"}"#).unwrap();
        let ctx = context(temp.path());

        let err = ctx.evaluator().main_complaint(&bob()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_reference_answer_force_refresh_rereads() {
        let (temp, ctx) = setup(1);
        let evaluator = ctx.evaluator();
        assert_eq!(
            evaluator.reference_answer(&bob(), false).unwrap().diagnosis,
            "diagnosis 1"
        );

        let path = temp.path().join("conversations/case1/case1.json");
        fs::write(&path, r#"{"Reference_Diagnostic": "revised"}"#).unwrap();

        assert_eq!(
            evaluator.reference_answer(&bob(), false).unwrap().diagnosis,
            "diagnosis 1"
        );
        assert_eq!(
            evaluator.reference_answer(&bob(), true).unwrap().diagnosis,
            "revised"
        );
    }

    #[test]
    fn test_record_operations_require_a_record() {
        let (_temp, ctx) = setup(1);
        let err = ctx
            .evaluator()
            .upsert_dimension_score(&bob(), "1", "LLM1", "logic", json!(4))
            .unwrap_err();
        assert!(matches!(err, CoreError::EvaluatorNotFound(_)));
    }

    #[test]
    fn test_scores_and_rankings_use_normalised_case_ids() {
        let (_temp, ctx) = setup(2);
        let evaluator = ctx.evaluator();
        evaluator.create_user(&bob()).unwrap();

        evaluator
            .upsert_dimension_score(&bob(), "1", "LLM1", "logic", json!(4))
            .unwrap();
        let mut tiers = Map::new();
        tiers.insert("top".into(), json!(["LLM1"]));
        evaluator
            .replace_ranking_and_tiers(&bob(), "case1", vec![json!("LLM1")], tiers)
            .unwrap();

        let scores = evaluator.scores(&bob(), Some("case1")).unwrap();
        assert_eq!(scores["LLM1"]["dimensions"]["logic"], json!(4));
        assert_eq!(scores["ranking"], json!(["LLM1"]));

        let all = evaluator.scores(&bob(), None).unwrap();
        assert!(all.get("case1").is_some());

        let rankings = evaluator.rankings(&bob(), Some("1")).unwrap();
        assert_eq!(rankings["case1"].ranking, vec![json!("LLM1")]);

        let empty = evaluator.rankings(&bob(), Some("2")).unwrap();
        assert!(empty["case2"].ranking.is_empty());
    }

    #[test]
    fn test_merge_case_state_then_read() {
        let (_temp, ctx) = setup(1);
        let evaluator = ctx.evaluator();
        evaluator.create_user(&bob()).unwrap();

        let submissions: BTreeMap<String, EvaluatorScores> = serde_json::from_value(json!({
            "LLM1": {"dimensions": {"logic": 3}},
            "LLM2": {"dimensions": {"logic": 5}},
        }))
        .unwrap();
        let merged = evaluator
            .merge_case_state(&bob(), "1", vec![json!("LLM2"), json!("LLM1")], submissions)
            .unwrap();
        assert_eq!(merged, 2);

        let state = evaluator.read_case_state(&bob(), "case1").unwrap();
        assert!(state.saved);
        assert_eq!(state.evaluators.unwrap().len(), 2);
    }

    #[test]
    fn test_feedback_and_submit() {
        let (_temp, ctx) = setup(1);
        let evaluator = ctx.evaluator();
        evaluator.create_user(&bob()).unwrap();
        evaluator
            .save_feedback(&bob(), "1", "LLM1", "asks good questions".into())
            .unwrap();

        let results: BTreeMap<String, CaseEvaluation> = serde_json::from_value(json!({
            "1": {"ranking": ["LLM1"], "tiers": {}, "LLM1": {"dimensions": {"logic": 2}}}
        }))
        .unwrap();
        evaluator.submit(&bob(), results).unwrap();

        let record = evaluator.results(&bob()).unwrap();
        assert!(record.submitted_at.is_some());
        assert_eq!(record.feedback["case1"]["LLM1"], "asks good questions");
        assert!(record.is_case_saved("case1"));
    }

    #[test]
    fn test_model_output_and_case_evaluators() {
        let (temp, ctx) = setup(1);
        let dir = temp.path().join("conversations/case1");
        fs::write(
            dir.join("LLM1.json"),
            r#"{"conversation": [], "Diagnosis": "flu", "Treatment": "rest"}"#,
        )
        .unwrap();
        let evaluator = ctx.evaluator();

        assert_eq!(evaluator.model_output("1", "LLM1").unwrap().diagnosis, "flu");
        assert!(matches!(
            evaluator.model_output("1", "LLM9").unwrap_err(),
            CoreError::ConversationNotFound(_)
        ));
        assert!(evaluator.model_output("1", "case1").is_err());

        let recorded = evaluator.case_evaluators("case1").unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].id, "LLM1");
    }

    #[test]
    fn test_submission_eligibility_counts_model_outputs() {
        let (temp, ctx) = setup(2);
        let evaluator = ctx.evaluator();
        fs::write(temp.path().join("conversations/case1/LLM1.json"), "{}").unwrap();

        let eligibility = evaluator.submission_eligibility();
        assert_eq!(eligibility.completed_cases, 1);
        assert_eq!(eligibility.total_cases, 2);
        assert!(!eligibility.can_submit);

        fs::write(temp.path().join("conversations/case2/LLM2.json"), "{}").unwrap();
        assert!(evaluator.submission_eligibility().can_submit);
    }

    #[test]
    fn test_dimensions_fall_back_to_builtin() {
        let (_temp, ctx) = setup(1);
        assert_eq!(ctx.evaluator().dimensions().unwrap().len(), 8);
    }

    #[test]
    fn test_health_reports_catalog() {
        let (_temp, ctx) = setup(2);
        ctx.evaluator().current_case(&bob());

        let health = ctx.evaluator().health();
        assert_eq!(health.active_users, 1);
        assert_eq!(health.case_files, vec!["case1", "case2"]);
    }
}
