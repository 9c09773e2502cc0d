//! Runtime for executing conversation turns
//!
//! Each submission runs as its own tokio task. Progress flows back to the
//! caller over an mpsc channel; a thread accepts one turn at a time.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{build_llm_messages, TurnError, TurnEvent, TurnExecutor, INTERRUPTED_TOOL_RESULT};
pub use traits::*;

use crate::llm::LlmService;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;

/// Type alias for production runtime with concrete implementations
pub type ProductionRuntime = ChatRuntime<DatabaseStore, Arc<dyn LlmService>, ToolRegistryExecutor>;

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Error, PartialEq)]
pub enum RuntimeError {
    #[error("Thread {0} already has a turn in progress")]
    Busy(String),
}

/// Runs turns in the background and tracks which threads are busy
pub struct ChatRuntime<S, L, T> {
    executor: Arc<TurnExecutor<S, L, T>>,
    active: Arc<Mutex<HashSet<String>>>,
}

impl<S, L, T> Clone for ChatRuntime<S, L, T> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            active: self.active.clone(),
        }
    }
}

/// Marks a thread busy until dropped
pub struct ThreadGuard {
    thread_id: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.thread_id);
    }
}

enum TurnKind {
    Message(String),
    Resume,
}

impl<S, L, T> ChatRuntime<S, L, T>
where
    S: CheckpointStore + 'static,
    L: LlmService + 'static,
    T: ToolExecutor + 'static,
{
    pub fn new(executor: TurnExecutor<S, L, T>) -> Self {
        Self {
            executor: Arc::new(executor),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Whether a turn is running on the thread
    #[cfg(test)]
    pub fn is_busy(&self, thread_id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(thread_id)
    }

    /// Start a turn for a new user message.
    ///
    /// The returned receiver yields progress and ends with exactly one
    /// `Done` or `Error` event.
    pub fn submit(
        &self,
        thread_id: &str,
        text: String,
    ) -> Result<mpsc::Receiver<TurnEvent>, RuntimeError> {
        self.start(thread_id, TurnKind::Message(text))
    }

    /// Continue an interrupted turn
    pub fn resume(&self, thread_id: &str) -> Result<mpsc::Receiver<TurnEvent>, RuntimeError> {
        self.start(thread_id, TurnKind::Resume)
    }

    /// Hold a thread idle while other work touches its checkpoints.
    ///
    /// Fails with `Busy` if a turn is running; turns submitted while the
    /// guard lives are rejected the same way.
    pub fn reserve(&self, thread_id: &str) -> Result<ThreadGuard, RuntimeError> {
        self.claim(thread_id)
    }

    fn start(
        &self,
        thread_id: &str,
        kind: TurnKind,
    ) -> Result<mpsc::Receiver<TurnEvent>, RuntimeError> {
        let guard = self.claim(thread_id)?;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let executor = self.executor.clone();
        let thread_id = thread_id.to_string();

        tokio::spawn(async move {
            let _guard = guard;
            let result = match kind {
                TurnKind::Message(text) => executor.run_turn(&thread_id, text, &tx).await,
                TurnKind::Resume => executor.resume(&thread_id, &tx).await,
            };

            let event = match result {
                Ok(reply) => {
                    tracing::info!(thread_id = %thread_id, "Turn complete");
                    TurnEvent::Done {
                        message: reply.text(),
                    }
                }
                Err(e) => {
                    tracing::error!(
                        thread_id = %thread_id,
                        kind = e.kind(),
                        error = %e,
                        "Turn aborted"
                    );
                    TurnEvent::Error {
                        kind: e.kind(),
                        message: e.to_string(),
                    }
                }
            };
            let _ = tx.send(event).await;
        });

        Ok(rx)
    }

    fn claim(&self, thread_id: &str) -> Result<ThreadGuard, RuntimeError> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(thread_id.to_string()) {
            tracing::warn!(thread_id = %thread_id, "Rejected concurrent submission");
            return Err(RuntimeError::Busy(thread_id.to_string()));
        }
        Ok(ThreadGuard {
            thread_id: thread_id.to_string(),
            active: self.active.clone(),
        })
    }
}
