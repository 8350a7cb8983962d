//! Constants used throughout the medsim core crate.
//!
//! This module contains path, filename and prompt constants to ensure
//! consistency across the codebase and make maintenance easier.

/// Default directory holding case folders when no explicit directory is configured.
pub const DEFAULT_CONVERSATIONS_DIR: &str = "conversations";

/// Default directory holding evaluator records when no explicit directory is configured.
pub const DEFAULT_EVALUATORS_DIR: &str = "evaluators";

/// Prefix shared by every case folder name (`case1`, `case2`, ...).
pub const CASE_FOLDER_PREFIX: &str = "case";

/// Filename of the static scoring dimension list, stored in the conversations root.
pub const EVALUATION_DIMENSIONS_FILENAME: &str = "evaluation_dimensions.json";

/// Extension of every persisted document.
pub const JSON_EXTENSION: &str = ".json";

/// Filename prefix of recorded model conversations inside a case folder.
pub const MODEL_OUTPUT_PREFIX: &str = "LLM";

/// Main complaint reported when a case document does not carry one.
pub const DEFAULT_MAIN_COMPLAINT: &str = "Feeling unwell";

/// Reply shown to the analyst when the chat collaborator fails.
pub const REPLY_UNAVAILABLE: &str = "AI service is currently unavailable. Please try again later.";

/// Final system message appended to every virtual patient conversation.
pub const ENGLISH_ONLY_INSTRUCTION: &str = "IMPORTANT: You MUST respond ONLY in English. Never use Chinese or any other language. All responses must be in English only.";
