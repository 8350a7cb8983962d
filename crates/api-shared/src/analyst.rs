//! Bodies for the analyst service (virtual patient interviews).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ChatReq {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChatRes {
    pub status: String,
    pub reply: String,
    /// True when `reply` is a placeholder because the chat service failed.
    pub degraded: bool,
}

/// Body of `next-step` and `previous-step`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct StepReq {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NextStepRes {
    pub status: String,
    pub message: String,
    pub next_case_index: usize,
    pub total_cases: usize,
    pub all_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PreviousStepRes {
    pub status: String,
    pub message: String,
    pub current_case_index: usize,
}

/// Current case of a session. Shared by both services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CurrentCaseRes {
    pub status: String,
    pub case_index: usize,
    pub case_folder: Option<String>,
    pub total_cases: usize,
    pub case_folders: Vec<String>,
    pub formatted_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MainComplaintRes {
    pub status: String,
    pub main_suit: String,
}

/// Body of `init-user`. Shared by both services.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct InitUserReq {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct InitUserRes {
    pub status: String,
    pub user_id: String,
    pub username: String,
    pub next_case_index: usize,
    pub total_cases: usize,
    pub all_complete: bool,
    pub case_folder: Option<String>,
    pub main_suit: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SavedConversationQuery {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub case_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SavedConversationRes {
    pub status: String,
    #[schema(value_type = Vec<Object>)]
    pub conversation: Vec<Value>,
    #[serde(rename = "Diagnosis")]
    pub diagnosis: String,
    #[serde(rename = "Treatment")]
    pub treatment: String,
    pub file: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SaveConversationReq {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Target case; the session's current case when absent.
    #[serde(default)]
    pub case_index: Option<usize>,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub conversation: Vec<Value>,
    #[serde(rename = "Diagnosis", default)]
    pub diagnosis: String,
    #[serde(rename = "Treatment", default)]
    pub treatment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SaveConversationRes {
    pub status: String,
    pub file: String,
    pub case_dir: String,
    pub case_index: usize,
    pub content_mismatch: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ClassifyReq {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClassifyRes {
    pub status: String,
    /// One of `symptom`, `sign`, `examination`, `history`, `other`.
    pub category: String,
    pub message: String,
}
