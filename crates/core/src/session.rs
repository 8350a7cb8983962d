//! Session state store.
//!
//! Keeps one in-memory [`SessionState`] per username for the lifetime of the process. The map
//! lock is held only to look up or create an entry; each session then has its own lock, so
//! requests for different users never contend. Sessions are never evicted.

use crate::reply::ChatMessage;
use crate::repositories::cases::{CaseDocument, CaseLoader};
use medsim_types::Username;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Which flow a store serves. Analyst sessions carry the virtual patient transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Analyst,
    Evaluator,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub username: Username,
    pub current_case_index: usize,
    pub case_content: Option<CaseDocument>,
    pub message_history: Vec<ChatMessage>,
    pub initialized: bool,
    pub user_id: Option<String>,
}

impl SessionState {
    pub fn new(username: Username) -> Self {
        Self {
            username,
            current_case_index: 0,
            case_content: None,
            message_history: Vec::new(),
            initialized: false,
            user_id: None,
        }
    }

    /// Point the session at `index` with freshly loaded content and an empty transcript.
    pub fn reset_to(&mut self, index: usize, content: Option<CaseDocument>) {
        self.current_case_index = index;
        self.case_content = content;
        self.message_history.clear();
        self.initialized = false;
    }
}

#[derive(Debug)]
pub struct SessionStore {
    kind: SessionKind,
    loader: CaseLoader,
    sessions: Mutex<HashMap<Username, Arc<Mutex<SessionState>>>>,
}

impl SessionStore {
    pub fn new(kind: SessionKind, loader: CaseLoader) -> Self {
        Self {
            kind,
            loader,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn loader(&self) -> &CaseLoader {
        &self.loader
    }

    /// The session for `username`, created at case index 0 if absent.
    pub fn get(&self, username: &Username) -> Arc<Mutex<SessionState>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(username.clone())
            .or_insert_with(|| {
                tracing::debug!("{:?} session created for {username}", self.kind);
                Arc::new(Mutex::new(SessionState::new(username.clone())))
            })
            .clone()
    }

    /// Run `f` with exclusive access to `username`'s session.
    ///
    /// Never call this across an `.await`; copy what is needed out of the session instead.
    pub fn with_session<R>(&self, username: &Username, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let session = self.get(username);
        let mut state = session.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Initialise `username`'s session on its current case; a no-op once initialised.
    ///
    /// Returns whether the session is initialised afterwards.
    pub fn initialize_session(&self, username: &Username) -> bool {
        self.with_session(username, |state| self.initialize(state))
    }

    /// Initialise an already locked session.
    ///
    /// Loads the case content if the session has none. Analyst sessions are seeded with the
    /// case's system prompts. If the content cannot be loaded the session stays uninitialised.
    pub fn initialize(&self, state: &mut SessionState) -> bool {
        if state.initialized {
            return true;
        }

        if state.case_content.is_none() {
            state.case_content = self.loader.load_case(state.current_case_index);
        }

        let Some(content) = &state.case_content else {
            tracing::warn!(
                "cannot initialise session for {}: case {} unavailable",
                state.username,
                state.current_case_index
            );
            return false;
        };

        if self.kind == SessionKind::Analyst {
            state.message_history = content.system_prompts();
        }
        state.initialized = true;
        true
    }

    /// Move an already locked session to `index`, reload its content and re-initialise it.
    pub fn navigate(&self, state: &mut SessionState, index: usize) -> bool {
        let previous = state.current_case_index;
        let content = self.loader.load_case(index);
        state.reset_to(index, content);
        tracing::info!("{} moved from case {previous} to {index}", state.username);
        self.initialize(state)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
