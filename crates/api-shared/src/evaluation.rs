//! Bodies for the evaluation service.
//!
//! Free-form score and ranking values are passed through as JSON; the core decides what they
//! mean.

use crate::CaseIdParam;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct EvaluatorUserReq {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CreateEvaluatorRes {
    pub status: String,
    pub message: String,
    pub username: String,
    pub created: bool,
    pub user_file: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct NavigateReq {
    #[serde(default)]
    pub username: String,
    /// `next` or `previous`.
    #[serde(default = "default_direction")]
    pub direction: String,
}

fn default_direction() -> String {
    "next".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NavigateRes {
    pub status: String,
    pub message: String,
    pub direction: String,
    pub previous_index: usize,
    pub current_index: usize,
    pub total_cases: usize,
    pub case_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AnswerQuery {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AnswerRes {
    pub status: String,
    pub diagnostic: String,
    pub treatment: String,
    /// Narrative and exam findings as a JSON string.
    #[serde(rename = "originalCase")]
    pub original_case: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SubmitReq {
    #[serde(default)]
    pub username: String,
    /// case id -> case evaluation, in the on-disk layout.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub evaluation_results: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct FeedbackReq {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    #[schema(value_type = String)]
    pub case_id: CaseIdParam,
    #[serde(default)]
    pub evaluator_id: String,
    #[serde(default)]
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FeedbackRes {
    pub status: String,
    pub message: String,
    pub username: String,
    pub case_id: String,
    pub evaluator_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResultsRes {
    pub status: String,
    pub username: String,
    #[schema(value_type = Object)]
    pub user_data: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct DimensionScoreReq {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    #[schema(value_type = String)]
    pub case_id: CaseIdParam,
    #[serde(default)]
    pub evaluator_id: String,
    #[serde(default)]
    pub dimension_key: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub score: Value,
}

/// Query of `get-user-scores` and `get-ranking`; `case_id` narrows the answer to one case.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CaseFilterQuery {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub case_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScoresRes {
    pub status: String,
    #[schema(value_type = Object)]
    pub scores: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CaseReq {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    #[schema(value_type = String)]
    pub case_id: CaseIdParam,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SaveRankingReq {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    #[schema(value_type = String)]
    pub case_id: CaseIdParam,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub ranking: Vec<Value>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub tiers: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RankingPair {
    #[schema(value_type = Vec<Object>)]
    pub ranking: Vec<Value>,
    #[schema(value_type = Object)]
    pub tiers: Map<String, Value>,
}

/// `ranking`/`tiers` for a single case, or `rankings` keyed by case id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RankingRes {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Vec<Object>>)]
    pub ranking: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub tiers: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rankings: Option<BTreeMap<String, RankingPair>>,
}

/// Body of `save-case-state`.
///
/// Evaluator entries are sent as top-level keys next to `username`, `case_id` and `ranking`;
/// any object carrying a `dimensions` key is taken as one.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SaveCaseStateReq {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    #[schema(value_type = String)]
    pub case_id: CaseIdParam,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub ranking: Vec<Value>,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub evaluators: Map<String, Value>,
}

impl SaveCaseStateReq {
    /// The evaluator entries of the body.
    pub fn evaluator_entries(&self) -> Map<String, Value> {
        self.evaluators
            .iter()
            .filter(|(_, value)| value.get("dimensions").is_some_and(Value::is_object))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SaveCaseStateRes {
    pub status: String,
    pub message: String,
    pub evaluators_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EligibilityRes {
    pub status: String,
    pub can_submit: bool,
    pub completed_cases: usize,
    pub total_cases: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CaseStateQuery {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub case_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CaseStateRes {
    pub status: String,
    #[schema(value_type = Object)]
    pub case_state: Value,
}

/// One recorded conversation as shown to an evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EvaluatorDataRes {
    pub status: String,
    #[schema(value_type = Vec<Object>)]
    pub conversation: Vec<Value>,
    pub diagnosis: String,
    pub treatment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RecordedConversationRes {
    pub id: String,
    pub name: String,
    pub file: String,
    #[schema(value_type = Object)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CaseEvaluatorsRes {
    pub status: String,
    pub case_id: String,
    pub evaluators: Vec<RecordedConversationRes>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DimensionRes {
    pub dimension: String,
    pub anchors: BTreeMap<String, String>,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EvaluationHealthRes {
    pub status: String,
    pub service: String,
    pub active_users: usize,
    pub total_cases: usize,
    pub case_files: Vec<String>,
    pub conversations_dir: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn save_case_state_picks_out_evaluator_entries() {
        let req: SaveCaseStateReq = serde_json::from_value(json!({
            "username": "bob",
            "case_id": 3,
            "ranking": ["LLM2", "LLM1"],
            "LLM1": {"dimensions": {"logic": 4}},
            "LLM2": {"dimensions": {"logic": 2}, "note": "x"},
            "notes": "free text",
            "LLM3": {"score": 1}
        }))
        .unwrap();

        assert_eq!(req.case_id.as_text(), "3");
        let entries = req.evaluator_entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.contains_key("LLM1"));
        assert!(entries.contains_key("LLM2"));
    }

    #[test]
    fn navigate_defaults_to_next() {
        let req: NavigateReq = serde_json::from_value(json!({"username": "bob"})).unwrap();
        assert_eq!(req.direction, "next");
    }

    #[test]
    fn ranking_res_omits_absent_fields() {
        let res = RankingRes {
            status: "success".into(),
            ranking: None,
            tiers: None,
            rankings: Some(BTreeMap::new()),
        };
        assert_eq!(
            serde_json::to_value(res).unwrap(),
            json!({"status": "success", "rankings": {}})
        );
    }
}
