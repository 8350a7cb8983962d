//! # MedSim Core
//!
//! Core logic for the virtual patient case engine.
//!
//! This crate owns the persisted state and the rules that move users through cases:
//! - Case catalog and case documents under `CONVERSATIONS_DIR`
//! - Per-user session state for the analyst and evaluator flows
//! - Saved analyst conversations (one file per user per case)
//! - Evaluation records under `EVALUATORS_DIR`, merged under per-document locks
//! - Progression: the next case a user has not completed
//!
//! **No API concerns**: HTTP servers and request parsing belong in `api-rest`; the chat model
//! client lives in `medsim-llm` behind the [`ReplyGenerator`] trait.

pub mod analyst;
pub mod config;
pub mod constants;
pub mod context;
pub mod dimensions;
pub mod error;
pub mod evaluation;
pub mod evaluator;
pub mod paths;
pub mod progression;
pub mod reply;
pub mod repositories;
pub mod session;

pub use analyst::{AnalystService, ChatReply, NextStep, SaveOutcome, SavedConversation};
pub use config::{CoreConfig, LlmSettings};
pub use context::{AppContext, CurrentCase, InitOutcome};
pub use dimensions::Dimension;
pub use error::{CoreError, CoreResult};
pub use evaluation::{
    CaseEntry, CaseEvaluation, CaseState, EvaluationRecord, EvaluatorScores, RankingAndTiers,
};
pub use evaluator::{
    parse_case_id, Direction, EvaluatorHealth, EvaluatorService, Navigation, SubmissionEligibility,
};
pub use paths::cases::CaseFolder;
pub use progression::NextCase;
pub use reply::{
    ChatMessage, MessageCategory, ReplyError, ReplyGenerator, Role, UnconfiguredReplyGenerator,
};
pub use repositories::cases::{CaseDocument, ReferenceAnswer};
pub use repositories::conversations::{ConversationRecord, RecordedConversation};
pub use repositories::evaluations::TouchOutcome;

pub use medsim_types::{TextError, Username};
