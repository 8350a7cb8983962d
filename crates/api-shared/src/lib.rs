//! # API Shared
//!
//! Shared definitions for the MedSim HTTP APIs.
//!
//! Contains:
//! - Request and response bodies for the analyst service (`analyst` module)
//! - Request and response bodies for the evaluation service (`evaluation` module)
//! - Shared services like `HealthService`
//!
//! Field names follow the JSON the existing web client sends and expects, so a few keep their
//! legacy spelling (`main_suit`, `Diagnosis`, `originalCase`).

pub mod analyst;
pub mod evaluation;
pub mod health;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use health::HealthService;

/// Value of the `status` field on successful responses.
pub const STATUS_SUCCESS: &str = "success";

/// Value of the `status` field on error responses.
pub const STATUS_ERROR: &str = "error";

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub status: String,
    pub message: String,
}

impl ErrorRes {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR.into(),
            message: message.into(),
        }
    }
}

/// Success acknowledgement with a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MessageRes {
    pub status: String,
    pub message: String,
}

impl MessageRes {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_SUCCESS.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub status: String,
    pub service: String,
}

/// Query parameters that only identify the user.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UserQuery {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// A case id as clients send it in JSON bodies: `"case7"`, `"7"` or `7`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CaseIdParam {
    Number(u64),
    Text(String),
}

impl CaseIdParam {
    pub fn as_text(&self) -> String {
        match self {
            CaseIdParam::Number(n) => n.to_string(),
            CaseIdParam::Text(s) => s.clone(),
        }
    }
}

impl Default for CaseIdParam {
    fn default() -> Self {
        CaseIdParam::Text(String::new())
    }
}
