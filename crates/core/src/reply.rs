//! The reply-generation seam.
//!
//! The virtual patient is played by an external chat-completion service. Core code only sees the
//! [`ReplyGenerator`] trait; concrete clients live in other crates and tests use fakes.

use crate::constants::REPLY_UNAVAILABLE;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Failure of the external chat collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("reply service is not configured: missing {}", missing.join(", "))]
    NotConfigured { missing: Vec<String> },
    #[error("reply request failed: {0}")]
    Request(String),
    #[error("reply service returned no usable content")]
    EmptyResponse,
}

impl ReplyError {
    /// Text shown to the user in place of a reply.
    pub fn placeholder(&self) -> String {
        match self {
            ReplyError::NotConfigured { .. } => format!("Configuration Error: {self}"),
            _ => REPLY_UNAVAILABLE.to_owned(),
        }
    }
}

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Produce the next assistant turn for an ordered transcript.
    async fn generate_reply(&self, messages: &[ChatMessage]) -> Result<String, ReplyError>;
}

/// Stand-in used when the chat service settings are incomplete; every call fails.
#[derive(Debug, Clone)]
pub struct UnconfiguredReplyGenerator {
    missing: Vec<String>,
}

impl UnconfiguredReplyGenerator {
    pub fn new(missing: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            missing: missing.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ReplyGenerator for UnconfiguredReplyGenerator {
    async fn generate_reply(&self, _messages: &[ChatMessage]) -> Result<String, ReplyError> {
        Err(ReplyError::NotConfigured {
            missing: self.missing.clone(),
        })
    }
}

/// Category of a virtual patient utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageCategory {
    Symptom,
    Sign,
    Examination,
    History,
    Other,
}

impl MessageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageCategory::Symptom => "symptom",
            MessageCategory::Sign => "sign",
            MessageCategory::Examination => "examination",
            MessageCategory::History => "history",
            MessageCategory::Other => "other",
        }
    }

    /// Parse a model answer; anything but an exact category name yields `None`.
    pub fn parse(answer: &str) -> Option<Self> {
        match answer.trim().to_lowercase().as_str() {
            "symptom" => Some(MessageCategory::Symptom),
            "sign" => Some(MessageCategory::Sign),
            "examination" => Some(MessageCategory::Examination),
            "history" => Some(MessageCategory::History),
            "other" => Some(MessageCategory::Other),
            _ => None,
        }
    }

    /// Single-turn prompt asking the model to classify `message`.
    pub fn classification_prompt(message: &str) -> String {
        format!(
            "Classify the following medical dialogue content. Reply with the category only, no explanation.\n\
             \n\
             Categories:\n\
             - symptom: what the patient feels (pain, discomfort, fever, chest tightness, palpitations, shortness of breath, syncope)\n\
             - sign: objective findings from the physical examination (temperature, blood pressure, heart rate, heart sounds, murmurs, lung auscultation)\n\
             - examination: laboratory and imaging investigations (blood count, ECG, echocardiogram, cardiac markers, thyroid function)\n\
             - history: past medical, family, social, surgical and medication history\n\
             - other: anything else\n\
             \n\
             Content: {message}\n\
             \n\
             Reply with exactly one of: symptom/sign/examination/history/other"
        )
    }
}

impl std::fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
