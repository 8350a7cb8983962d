//! Analyst flow.
//!
//! An analyst interviews the virtual patient for one case at a time, then saves the transcript
//! with a diagnosis and treatment. Forward navigation always lands on the first case the
//! analyst has not saved yet.

use crate::constants::DEFAULT_MAIN_COMPLAINT;
use crate::context::{AppContext, CurrentCase, InitOutcome};
use crate::error::{CoreError, CoreResult};
use crate::progression::{next_incomplete_index, previous_index, NextCase};
use crate::reply::{ChatMessage, MessageCategory};
use crate::repositories::conversations::ConversationRecord;
use medsim_types::Username;
use serde::Serialize;
use std::path::PathBuf;

/// Reply to one chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    pub reply: String,
    /// The reply is a placeholder because the chat service failed.
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NextStep {
    pub next: NextCase,
    pub total_cases: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedConversation {
    pub record: ConversationRecord,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    pub file: String,
    pub path: PathBuf,
    pub case_index: usize,
    /// The first turn does not mention the case's main complaint.
    pub content_mismatch: bool,
}

pub struct AnalystService<'a> {
    ctx: &'a AppContext,
}

impl<'a> AnalystService<'a> {
    pub fn new(ctx: &'a AppContext) -> Self {
        Self { ctx }
    }

    fn next_case(&self, username: &Username) -> NextCase {
        next_incomplete_index(
            self.ctx.catalog().list_cases(),
            self.ctx.conversations(),
            username,
        )
    }

    /// Place the user on their first unsaved case and start a fresh transcript.
    pub fn init_user(&self, username: &Username, user_id: Option<String>) -> InitOutcome {
        let user_id = user_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let next = self.next_case(username);
        let sessions = self.ctx.analyst_sessions();

        let main_complaint = sessions.with_session(username, |state| {
            state.user_id = Some(user_id.clone());
            sessions.navigate(state, next.index);
            state
                .case_content
                .as_ref()
                .and_then(|doc| doc.main_complaint.clone())
        });

        tracing::info!(
            "analyst {username} initialised on case index {} (all complete: {})",
            next.index,
            next.all_complete
        );

        InitOutcome {
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
        }
    }

    /// Send one analyst message to the virtual patient and record both turns.
    ///
    /// A chat service failure is not an error here: the reply becomes a placeholder text and
    /// is flagged as degraded.
    pub async fn chat(&self, username: &Username, message: String) -> ChatReply {
        let sessions = self.ctx.analyst_sessions();

        let (case_index, transcript) = sessions.with_session(username, |state| {
            sessions.initialize(state);
            state.message_history.push(ChatMessage::user(message));
            (state.current_case_index, state.message_history.clone())
        });

        let (reply, degraded) = match self.ctx.replies().generate_reply(&transcript).await {
            Ok(reply) => (reply, false),
            Err(e) => {
                tracing::error!("chat reply for {username} failed: {e}");
                (e.placeholder(), true)
            }
        };

        sessions.with_session(username, |state| {
            if state.current_case_index == case_index {
                state.message_history.push(ChatMessage::assistant(reply.clone()));
            } else {
                tracing::warn!(
                    "{username} moved from case {case_index} while awaiting a reply; reply not recorded"
                );
            }
        });

        ChatReply { reply, degraded }
    }

    /// Move to the first unsaved case.
    pub fn next_step(&self, username: &Username) -> NextStep {
        let next = self.next_case(username);
        let sessions = self.ctx.analyst_sessions();
        sessions.with_session(username, |state| {
            sessions.navigate(state, next.index);
        });

        NextStep {
            next,
            total_cases: self.ctx.catalog().len(),
        }
    }

    /// Move back one case, saved or not.
    ///
    /// # Errors
    ///
    /// `CoreError::AtFirstCase` when the session is already on the first case or the catalog is
    /// empty.
    pub fn previous_step(&self, username: &Username) -> CoreResult<usize> {
        if self.ctx.catalog().is_empty() {
            return Err(CoreError::AtFirstCase);
        }

        let sessions = self.ctx.analyst_sessions();
        sessions.with_session(username, |state| {
            let previous =
                previous_index(state.current_case_index).ok_or(CoreError::AtFirstCase)?;
            sessions.navigate(state, previous);
            Ok(previous)
        })
    }

    pub fn current_case(&self, username: &Username) -> CurrentCase {
        self.ctx
            .analyst_sessions()
            .with_session(username, |state| {
                CurrentCase::snapshot(self.ctx.catalog(), state, false)
            })
    }

    /// Main complaint of the current case, loading the case if needed.
    ///
    /// A case without a main complaint yields a generic default.
    pub fn main_complaint(&self, username: &Username) -> CoreResult<String> {
        let sessions = self.ctx.analyst_sessions();
        sessions.with_session(username, |state| {
            if state.case_content.is_none() {
                state.case_content = sessions.loader().load_case(state.current_case_index);
            }
            let content = state.case_content.as_ref().ok_or_else(|| {
                CoreError::CaseNotFound(format!("index {}", state.current_case_index))
            })?;

            Ok(match &content.main_complaint {
                Some(complaint) => complaint.clone(),
                None => {
                    tracing::warn!(
                        "case {} has no main complaint; using default",
                        state.current_case_index
                    );
                    DEFAULT_MAIN_COMPLAINT.to_owned()
                }
            })
        })
    }

    pub fn saved_conversation(
        &self,
        username: &Username,
        case_index: usize,
    ) -> CoreResult<SavedConversation> {
        let record = self
            .ctx
            .conversations()
            .load(username, case_index)?
            .ok_or_else(|| {
                CoreError::ConversationNotFound(format!("{username} on case index {case_index}"))
            })?;

        Ok(SavedConversation {
            record,
            file: username.json_file_name(),
        })
    }

    /// Persist a transcript for `case_index`, or the session's current case when absent.
    ///
    /// Always writes; an empty record still marks the case as done.
    pub fn save_conversation(
        &self,
        username: &Username,
        case_index: Option<usize>,
        record: &ConversationRecord,
    ) -> CoreResult<SaveOutcome> {
        let case_index = match case_index {
            Some(index) => index,
            None => self
                .ctx
                .analyst_sessions()
                .with_session(username, |state| state.current_case_index),
        };

        let content_mismatch = self.first_turn_mismatch(case_index, record);
        let path = self.ctx.conversations().save(username, case_index, record)?;

        Ok(SaveOutcome {
            file: username.json_file_name(),
            path,
            case_index,
            content_mismatch,
        })
    }

    fn first_turn_mismatch(&self, case_index: usize, record: &ConversationRecord) -> bool {
        let Some(first_turn) = record.first_turn_text() else {
            return false;
        };
        let Some(expected) = self
            .ctx
            .analyst_sessions()
            .loader()
            .load_case(case_index)
            .and_then(|doc| doc.main_complaint)
        else {
            return false;
        };

        if first_turn.contains(&expected) {
            return false;
        }

        let preview: String = first_turn.chars().take(100).collect();
        tracing::warn!(
            "conversation does not match case {case_index}: expected main complaint '{expected}', first turn '{preview}'"
        );
        true
    }

    /// Classify a virtual patient utterance. Any failure yields `Other`.
    pub async fn classify(&self, message: &str) -> MessageCategory {
        let prompt = vec![ChatMessage::user(MessageCategory::classification_prompt(
            message,
        ))];

        match self.ctx.replies().generate_reply(&prompt).await {
            Ok(answer) => MessageCategory::parse(&answer).unwrap_or_else(|| {
                tracing::warn!("invalid classification '{}'; using other", answer.trim());
                MessageCategory::Other
            }),
            Err(e) => {
                tracing::warn!("classification failed: {e}; using other");
                MessageCategory::Other
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::constants::REPLY_UNAVAILABLE;
    use crate::reply::{ReplyError, ReplyGenerator, Role, UnconfiguredReplyGenerator};
    use async_trait::async_trait;
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Replies with a fixed text and records every transcript it was given.
    struct ScriptedReplies {
        reply: Result<String, ()>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedReplies {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_owned()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ReplyGenerator for ScriptedReplies {
        async fn generate_reply(&self, messages: &[ChatMessage]) -> Result<String, ReplyError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.reply
                .clone()
                .map_err(|_| ReplyError::Request("connection refused".into()))
        }
    }

    fn seed_cases(root: &Path, complaints: &[&str]) {
        for (i, complaint) in complaints.iter().enumerate() {
            let name = format!("case{}", i + 1);
            let dir = root.join(&name);
            fs::create_dir_all(&dir).unwrap();
            let doc = json!({
                "prompt1": "You are a patient.",
                "prompt2": format!("Narrative {}", i + 1),
                "prompt3": {"BP": "120/80"},
                "personal_message": "Female, 40",
                "main_suit": complaint,
            });
            fs::write(dir.join(format!("{name}.json")), doc.to_string()).unwrap();
        }
    }

    fn context(root: &Path, replies: Arc<dyn ReplyGenerator>) -> AppContext {
        let cfg = Arc::new(CoreConfig::new(root.join("conversations"), root.join("evaluators")));
        AppContext::new(cfg, replies)
    }

    fn alice() -> Username {
        Username::parse("alice").unwrap()
    }

    #[test]
    fn test_init_user_lands_on_first_unsaved_case() {
        let temp = TempDir::new().unwrap();
        seed_cases(&temp.path().join("conversations"), &["cough", "fever", "rash"]);
        let ctx = context(temp.path(), ScriptedReplies::ok("hi"));
        let analyst = ctx.analyst();

        analyst
            .save_conversation(&alice(), Some(0), &ConversationRecord::default())
            .unwrap();

        let outcome = analyst.init_user(&alice(), Some("u-1".into()));
        assert_eq!(outcome.next.index, 1);
        assert_eq!(outcome.total_cases, 3);
        assert_eq!(outcome.user_id, "u-1");
        assert_eq!(outcome.case_folder.as_deref(), Some("case2"));
        assert_eq!(outcome.main_complaint.as_deref(), Some("fever"));
    }

    #[test]
    fn test_init_user_generates_user_id() {
        let temp = TempDir::new().unwrap();
        seed_cases(&temp.path().join("conversations"), &["cough"]);
        let ctx = context(temp.path(), ScriptedReplies::ok("hi"));

        let outcome = ctx.analyst().init_user(&alice(), None);
        assert!(uuid::Uuid::parse_str(&outcome.user_id).is_ok());
    }

    #[tokio::test]
    async fn test_chat_sends_system_prompts_and_records_turns() {
        let temp = TempDir::new().unwrap();
        seed_cases(&temp.path().join("conversations"), &["cough"]);
        let replies = ScriptedReplies::ok("I have been coughing for a week.");
        let ctx = context(temp.path(), replies.clone());
        let analyst = ctx.analyst();

        let reply = analyst.chat(&alice(), "What brings you in?".into()).await;

        assert_eq!(reply.reply, "I have been coughing for a week.");
        assert!(!reply.degraded);

        let seen = replies.seen.lock().unwrap();
        assert_eq!(seen[0].len(), 5);
        assert_eq!(seen[0][4], ChatMessage::user("What brings you in?"));

        let history = ctx
            .analyst_sessions()
            .with_session(&alice(), |s| s.message_history.clone());
        assert_eq!(history.len(), 6);
        assert_eq!(history[5].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_chat_failure_returns_placeholder() {
        let temp = TempDir::new().unwrap();
        seed_cases(&temp.path().join("conversations"), &["cough"]);
        let ctx = context(temp.path(), ScriptedReplies::failing());

        let reply = ctx.analyst().chat(&alice(), "Hello".into()).await;
        assert!(reply.degraded);
        assert_eq!(reply.reply, REPLY_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_chat_when_unconfigured_reports_configuration_error() {
        let temp = TempDir::new().unwrap();
        seed_cases(&temp.path().join("conversations"), &["cough"]);
        let ctx = context(
            temp.path(),
            Arc::new(UnconfiguredReplyGenerator::new(["OPENAI_MODEL"])),
        );

        let reply = ctx.analyst().chat(&alice(), "Hello".into()).await;
        assert!(reply.degraded);
        assert!(reply.reply.starts_with("Configuration Error:"));
    }

    #[test]
    fn test_next_step_skips_saved_cases() {
        let temp = TempDir::new().unwrap();
        seed_cases(&temp.path().join("conversations"), &["a", "b", "c", "d", "e"]);
        let ctx = context(temp.path(), ScriptedReplies::ok("hi"));
        let analyst = ctx.analyst();

        for index in [0, 1, 3] {
            analyst
                .save_conversation(&alice(), Some(index), &ConversationRecord::default())
                .unwrap();
        }
        assert_eq!(analyst.next_step(&alice()).next.index, 2);

        analyst
            .save_conversation(&alice(), Some(2), &ConversationRecord::default())
            .unwrap();
        analyst
            .save_conversation(&alice(), Some(4), &ConversationRecord::default())
            .unwrap();
        let step = analyst.next_step(&alice());
        assert_eq!(step.next.index, 4);
        assert!(step.next.all_complete);
    }

    #[test]
    fn test_previous_step_boundary() {
        let temp = TempDir::new().unwrap();
        seed_cases(&temp.path().join("conversations"), &["a", "b", "c", "d"]);
        let ctx = context(temp.path(), ScriptedReplies::ok("hi"));
        let analyst = ctx.analyst();

        assert!(matches!(
            analyst.previous_step(&alice()).unwrap_err(),
            CoreError::AtFirstCase
        ));

        ctx.analyst_sessions().with_session(&alice(), |state| {
            ctx.analyst_sessions().navigate(state, 3);
        });
        assert_eq!(analyst.previous_step(&alice()).unwrap(), 2);
        assert_eq!(analyst.current_case(&alice()).case_index, 2);
    }

    #[test]
    fn test_main_complaint_defaults_when_missing() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("conversations");
        fs::create_dir_all(root.join("case1")).unwrap();
        fs::write(root.join("case1").join("case1.json"), r#"{"prompt1": "x"}"#).unwrap();
        let ctx = context(temp.path(), ScriptedReplies::ok("hi"));

        assert_eq!(
            ctx.analyst().main_complaint(&alice()).unwrap(),
            DEFAULT_MAIN_COMPLAINT
        );
    }

    #[test]
    fn test_save_and_reload_conversation() {
        let temp = TempDir::new().unwrap();
        seed_cases(&temp.path().join("conversations"), &["cough"]);
        let ctx = context(temp.path(), ScriptedReplies::ok("hi"));
        let analyst = ctx.analyst();

        let record = ConversationRecord {
            conversation: vec![json!({"role": "user", "content": "I have a cough"})],
            diagnosis: "Bronchitis".into(),
            treatment: "Fluids".into(),
        };
        let outcome = analyst.save_conversation(&alice(), None, &record).unwrap();
        assert_eq!(outcome.case_index, 0);
        assert_eq!(outcome.file, "alice.json");
        assert!(!outcome.content_mismatch);

        let saved = analyst.saved_conversation(&alice(), 0).unwrap();
        assert_eq!(saved.record, record);
    }

    #[test]
    fn test_save_flags_content_mismatch_but_still_writes() {
        let temp = TempDir::new().unwrap();
        seed_cases(&temp.path().join("conversations"), &["cough"]);
        let ctx = context(temp.path(), ScriptedReplies::ok("hi"));

        let record = ConversationRecord {
            conversation: vec![json!({"role": "user", "content": "My knee hurts"})],
            ..Default::default()
        };
        let outcome = ctx
            .analyst()
            .save_conversation(&alice(), Some(0), &record)
            .unwrap();

        assert!(outcome.content_mismatch);
        assert!(outcome.path.is_file());
    }

    #[test]
    fn test_saved_conversation_missing() {
        let temp = TempDir::new().unwrap();
        seed_cases(&temp.path().join("conversations"), &["cough"]);
        let ctx = context(temp.path(), ScriptedReplies::ok("hi"));

        let err = ctx.analyst().saved_conversation(&alice(), 0).unwrap_err();
        assert!(matches!(err, CoreError::ConversationNotFound(_)));
    }

    #[tokio::test]
    async fn test_classify_falls_back_to_other() {
        let temp = TempDir::new().unwrap();
        let ok = context(temp.path(), ScriptedReplies::ok(" Sign\n"));
        assert_eq!(
            ok.analyst().classify("BP 150/90").await,
            MessageCategory::Sign
        );

        let invalid = context(temp.path(), ScriptedReplies::ok("probably a symptom"));
        assert_eq!(
            invalid.analyst().classify("I feel dizzy").await,
            MessageCategory::Other
        );

        let failing = context(temp.path(), ScriptedReplies::failing());
        assert_eq!(
            failing.analyst().classify("I feel dizzy").await,
            MessageCategory::Other
        );
    }
}
