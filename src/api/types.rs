//! API request and response types

use crate::db::CheckpointSummary;
use crate::graph::{Message, Node};
use serde::{Deserialize, Serialize};

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

/// Response with every persisted thread
#[derive(Debug, Serialize)]
pub struct ThreadListResponse {
    pub threads: Vec<String>,
}

/// Latest state of a thread
#[derive(Debug, Serialize)]
pub struct ThreadStateResponse {
    pub thread_id: String,
    /// Step of the latest checkpoint; absent for unknown threads
    pub step: Option<i64>,
    pub next: Option<Node>,
    /// True when a turn stopped before reaching the end
    pub interrupted: bool,
    pub messages: Vec<Message>,
}

/// Checkpoint history of a thread, oldest first
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub thread_id: String,
    pub checkpoints: Vec<CheckpointSummary>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
