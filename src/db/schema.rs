//! Database schema and types

use crate::graph::{ConversationState, Node, StepSource};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS checkpoints (
    thread_id TEXT NOT NULL,
    step INTEGER NOT NULL,
    checkpoint_id TEXT NOT NULL UNIQUE,
    parent_checkpoint_id TEXT,
    source TEXT NOT NULL,
    next_node TEXT,
    state TEXT NOT NULL,
    created_at TEXT NOT NULL,

    PRIMARY KEY (thread_id, step)
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_created ON checkpoints(created_at);
";

/// A persisted snapshot of a thread's history at a step boundary
#[derive(Debug, Clone, Serialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub thread_id: String,
    /// Zero-based, strictly increasing within a thread
    pub step: i64,
    pub parent_checkpoint_id: Option<String>,
    pub source: StepSource,
    /// Node that runs next; `None` once the turn has ended
    pub next: Option<Node>,
    pub state: ConversationState,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Whether the turn that wrote this checkpoint stopped before finishing
    pub fn is_interrupted(&self) -> bool {
        self.next.is_some()
    }
}

/// Summary row for checkpoint history listings
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointSummary {
    pub checkpoint_id: String,
    pub step: i64,
    pub source: StepSource,
    pub next: Option<Node>,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&Checkpoint> for CheckpointSummary {
    fn from(cp: &Checkpoint) -> Self {
        Self {
            checkpoint_id: cp.checkpoint_id.clone(),
            step: cp.step,
            source: cp.source,
            next: cp.next,
            message_count: cp.state.messages.len(),
            created_at: cp.created_at,
        }
    }
}
