//! Application context.
//!
//! [`AppContext`] owns every long-lived piece of state: the case catalog, one session store per
//! flow, the conversation and evaluation stores, and the reply generator. It is built once at
//! startup and shared (usually as `Arc<AppContext>`) with whatever serves requests. Nothing in
//! the core keeps process-wide globals.

use crate::analyst::AnalystService;
use crate::config::CoreConfig;
use crate::evaluator::EvaluatorService;
use crate::progression::NextCase;
use crate::reply::ReplyGenerator;
use crate::repositories::cases::{CaseDocument, CaseLoader};
use crate::repositories::catalog::CaseCatalog;
use crate::repositories::conversations::ConversationStore;
use crate::repositories::evaluations::EvaluationStore;
use crate::session::{SessionKind, SessionState, SessionStore};
use serde::Serialize;
use std::sync::Arc;

pub struct AppContext {
    cfg: Arc<CoreConfig>,
    catalog: Arc<CaseCatalog>,
    analyst_sessions: SessionStore,
    evaluator_sessions: SessionStore,
    conversations: ConversationStore,
    evaluations: EvaluationStore,
    replies: Arc<dyn ReplyGenerator>,
}

impl AppContext {
    pub fn new(cfg: Arc<CoreConfig>, replies: Arc<dyn ReplyGenerator>) -> Self {
        let catalog = Arc::new(CaseCatalog::new(cfg.clone()));
        let loader = CaseLoader::new(catalog.clone());

        Self {
            analyst_sessions: SessionStore::new(SessionKind::Analyst, loader.clone()),
            evaluator_sessions: SessionStore::new(SessionKind::Evaluator, loader),
            conversations: ConversationStore::new(cfg.clone(), catalog.clone()),
            evaluations: EvaluationStore::new(cfg.clone()),
            catalog,
            replies,
            cfg,
        }
    }

    pub fn cfg(&self) -> &CoreConfig {
        &self.cfg
    }

    pub fn catalog(&self) -> &CaseCatalog {
        &self.catalog
    }

    pub fn analyst_sessions(&self) -> &SessionStore {
        &self.analyst_sessions
    }

    pub fn evaluator_sessions(&self) -> &SessionStore {
        &self.evaluator_sessions
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn evaluations(&self) -> &EvaluationStore {
        &self.evaluations
    }

    pub fn replies(&self) -> &dyn ReplyGenerator {
        self.replies.as_ref()
    }

    pub fn analyst(&self) -> AnalystService<'_> {
        AnalystService::new(self)
    }

    pub fn evaluator(&self) -> EvaluatorService<'_> {
        EvaluatorService::new(self)
    }

    /// Log what the context holds; call once when serving stops.
    pub fn shutdown(&self) {
        tracing::info!(
            "shutting down: {} analyst sessions, {} evaluator sessions, {} cases",
            self.analyst_sessions.active_sessions(),
            self.evaluator_sessions.active_sessions(),
            self.catalog.len()
        );
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("cfg", &self.cfg)
            .field("cases", &self.catalog.len())
            .finish_non_exhaustive()
    }
}

/// Result of initialising a user on either flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitOutcome {
    pub username: String,
    pub user_id: String,
    pub next: NextCase,
    pub total_cases: usize,
    pub case_folder: Option<String>,
    pub main_complaint: Option<String>,
}

/// Snapshot of the case a session is on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentCase {
    pub case_index: usize,
    pub case_folder: Option<String>,
    pub total_cases: usize,
    pub case_folders: Vec<String>,
    pub formatted_data: String,
}

impl CurrentCase {
    pub(crate) fn snapshot(
        catalog: &CaseCatalog,
        state: &SessionState,
        include_main_complaint: bool,
    ) -> Self {
        Self {
            case_index: state.current_case_index,
            case_folder: catalog
                .get(state.current_case_index)
                .map(|d| d.folder.name().to_owned()),
            total_cases: catalog.len(),
            case_folders: catalog.folder_names(),
            formatted_data: state
                .case_content
                .as_ref()
                .map(|doc: &CaseDocument| doc.patient_summary(include_main_complaint))
                .unwrap_or_default(),
        }
    }
}
