//! Per-browser session view state
//!
//! A session tracks the active thread, the threads it knows about and the
//! messages shown for the active thread. Sessions live in memory only; the
//! conversations themselves are in the checkpoint store.

use crate::db::Database;
use crate::graph::{render_value, ConversationState, Message};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Who a displayed message is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayRole {
    User,
    Assistant,
    Tool,
}

/// A message formatted for the chat view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayMessage {
    pub role: DisplayRole,
    pub content: String,
    /// Tool name, for tool entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

impl DisplayMessage {
    fn user(content: impl Into<String>) -> Self {
        Self {
            role: DisplayRole::User,
            content: content.into(),
            tool: None,
        }
    }

    fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: DisplayRole::Assistant,
            content: content.into(),
            tool: None,
        }
    }
}

/// Format a thread's history for display.
///
/// Tool requests without text have nothing to show and are skipped.
pub fn display_messages(state: &ConversationState) -> Vec<DisplayMessage> {
    state
        .messages
        .iter()
        .filter_map(|message| match message {
            Message::User { content } => Some(DisplayMessage::user(content)),
            Message::Assistant { content } => Some(DisplayMessage::assistant(content)),
            Message::ToolRequest { content, .. } if content.is_empty() => None,
            Message::ToolRequest { content, .. } => Some(DisplayMessage::assistant(content)),
            Message::ToolResult { name, content, .. } => Some(DisplayMessage {
                role: DisplayRole::Tool,
                content: render_value(content),
                tool: Some(name.clone()),
            }),
        })
        .collect()
}

/// Thread list entry in a session view
#[derive(Debug, Clone, Serialize)]
pub struct ThreadEntry {
    pub thread_id: String,
    pub label: String,
    pub active: bool,
}

/// Everything the front end needs to render a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub thread_id: String,
    pub threads: Vec<ThreadEntry>,
    pub messages: Vec<DisplayMessage>,
    pub busy: bool,
}

/// View state of one browser session
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    /// Active thread
    pub thread_id: String,
    /// Known threads, oldest first
    pub threads: Vec<String>,
    pub history: Vec<DisplayMessage>,
    busy: bool,
}

fn generate_thread_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Session {
    /// Start a session on a fresh thread
    pub fn new(known_threads: Vec<String>) -> Self {
        let mut session = Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            thread_id: generate_thread_id(),
            threads: known_threads,
            history: Vec::new(),
            busy: false,
        };
        session.add_thread(&session.thread_id.clone());
        session
    }

    fn add_thread(&mut self, thread_id: &str) {
        if !self.threads.iter().any(|t| t == thread_id) {
            self.threads.push(thread_id.to_string());
        }
    }

    /// Switch to a brand new, empty thread
    pub fn new_thread(&mut self) {
        self.thread_id = generate_thread_id();
        self.add_thread(&self.thread_id.clone());
        self.history.clear();
    }

    /// Activate a thread and show its persisted history
    pub fn select_thread(&mut self, thread_id: &str, state: &ConversationState) {
        self.thread_id = thread_id.to_string();
        self.add_thread(thread_id);
        self.history = display_messages(state);
    }

    /// Drop a thread from the list.
    ///
    /// Removing the active thread moves the session to a new thread.
    pub fn remove_thread(&mut self, thread_id: &str) {
        self.threads.retain(|t| t != thread_id);
        if self.thread_id == thread_id {
            self.new_thread();
        }
    }

    /// Show the user's message and mark the session busy.
    ///
    /// Returns the thread the message belongs to.
    pub fn begin_submission(&mut self, text: &str) -> String {
        self.history.push(DisplayMessage::user(text));
        self.busy = true;
        self.thread_id.clone()
    }

    /// End a submission; the reply is shown only if its thread is still active
    pub fn finish_submission(&mut self, thread_id: &str, reply: Option<&str>) {
        self.busy = false;
        if let Some(reply) = reply {
            if self.thread_id == thread_id {
                self.history.push(DisplayMessage::assistant(reply));
            }
        }
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Threads most recent first, labelled `Conversation 1..n`
    pub fn view(&self) -> SessionView {
        let threads = self
            .threads
            .iter()
            .rev()
            .enumerate()
            .map(|(idx, thread_id)| ThreadEntry {
                thread_id: thread_id.clone(),
                label: format!("Conversation {}", idx + 1),
                active: *thread_id == self.thread_id,
            })
            .collect();

        SessionView {
            session_id: self.session_id.clone(),
            thread_id: self.thread_id.clone(),
            threads,
            messages: self.history.clone(),
            busy: self.busy,
        }
    }
}

// ============================================================================
// Session manager
// ============================================================================

/// Thread operations the UI needs from storage
pub trait ThreadStore: Send + Sync {
    fn list_threads(&self) -> Result<Vec<String>, String>;
    fn get_state(&self, thread_id: &str) -> Result<ConversationState, String>;
    fn delete_thread(&self, thread_id: &str) -> Result<usize, String>;
}

impl ThreadStore for Database {
    fn list_threads(&self) -> Result<Vec<String>, String> {
        Database::list_threads(self).map_err(|e| e.to_string())
    }

    fn get_state(&self, thread_id: &str) -> Result<ConversationState, String> {
        Database::get_state(self, thread_id).map_err(|e| e.to_string())
    }

    fn delete_thread(&self, thread_id: &str) -> Result<usize, String> {
        Database::delete_thread(self, thread_id).map_err(|e| e.to_string())
    }
}

/// All live sessions
pub struct SessionManager {
    store: Arc<dyn ThreadStore>,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn ThreadStore>) -> Self {
        Self {
            store,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_session<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, SessionError> {
        let mut sessions = self.sessions();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        Ok(f(session))
    }

    /// Create a session that knows every persisted thread
    pub fn create(&self) -> SessionView {
        let known = self.store.list_threads().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to list threads for new session");
            Vec::new()
        });
        let session = Session::new(known);
        let view = session.view();
        tracing::info!(session_id = %session.session_id, thread_id = %session.thread_id, "Session created");
        self.sessions().insert(session.session_id.clone(), session);
        view
    }

    pub fn view(&self, session_id: &str) -> Result<SessionView, SessionError> {
        self.with_session(session_id, |s| s.view())
    }

    pub fn new_thread(&self, session_id: &str) -> Result<SessionView, SessionError> {
        self.with_session(session_id, |s| {
            s.new_thread();
            s.view()
        })
    }

    pub fn select_thread(
        &self,
        session_id: &str,
        thread_id: &str,
    ) -> Result<SessionView, SessionError> {
        // Fail fast on unknown sessions before touching storage
        self.with_session(session_id, |_| ())?;
        let state = self
            .store
            .get_state(thread_id)
            .map_err(SessionError::Storage)?;
        self.with_session(session_id, |s| {
            s.select_thread(thread_id, &state);
            s.view()
        })
    }

    /// Best-effort delete: a storage failure is logged and the session is
    /// updated anyway.
    pub fn delete_thread(
        &self,
        session_id: &str,
        thread_id: &str,
    ) -> Result<SessionView, SessionError> {
        self.with_session(session_id, |_| ())?;
        match self.store.delete_thread(thread_id) {
            Ok(removed) => {
                tracing::info!(thread_id = %thread_id, checkpoints = removed, "Thread deleted");
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    thread_id = %thread_id,
                    error = %e,
                    "Failed to delete thread checkpoints"
                );
            }
        }
        self.with_session(session_id, |s| {
            s.remove_thread(thread_id);
            s.view()
        })
    }

    /// Reload the persisted history into every session showing the thread
    pub fn refresh_thread(&self, thread_id: &str) {
        let state = match self.store.get_state(thread_id) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(thread_id = %thread_id, error = %e, "Failed to reload thread");
                return;
            }
        };
        for session in self.sessions().values_mut() {
            if session.thread_id == thread_id {
                session.history = display_messages(&state);
            }
        }
    }

    /// Returns the thread the message was submitted on
    pub fn begin_submission(&self, session_id: &str, text: &str) -> Result<String, SessionError> {
        self.with_session(session_id, |s| s.begin_submission(text))
    }

    pub fn finish_submission(&self, session_id: &str, thread_id: &str, reply: Option<&str>) {
        if self
            .with_session(session_id, |s| s.finish_submission(thread_id, reply))
            .is_err()
        {
            tracing::debug!(session_id = %session_id, "Submission finished for a vanished session");
        }
    }
}
