//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use super::TurnEvent;
use crate::db::Checkpoint;
use crate::graph::{ConversationState, Node, StepSource, ToolCall};
use crate::llm::{LlmError, LlmRequest, LlmService, LlmStream, StreamChunk, ToolDefinition};
use crate::tools::{ToolError, ToolOutput, ToolRegistry, DIVIDE_BY_ZERO};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Scripted replies
// ============================================================================

/// A reply streamed as the given text pieces
pub fn reply_text(pieces: &[&str]) -> Vec<StreamChunk> {
    let mut chunks: Vec<StreamChunk> = pieces
        .iter()
        .map(|p| StreamChunk::Text((*p).to_string()))
        .collect();
    chunks.push(StreamChunk::Finish {
        reason: "STOP".into(),
    });
    chunks
}

/// A reply that requests the given tool calls
pub fn reply_tools(calls: Vec<ToolCall>) -> Vec<StreamChunk> {
    let mut chunks: Vec<StreamChunk> = calls
        .into_iter()
        .map(|c| StreamChunk::ToolUse {
            id: c.id,
            name: c.name,
            input: c.arguments,
        })
        .collect();
    chunks.push(StreamChunk::Finish {
        reason: "STOP".into(),
    });
    chunks
}

/// Drain a closed event channel
pub async fn collect_events(mut rx: mpsc::Receiver<TurnEvent>) -> Vec<TurnEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

// ============================================================================
// Mock LLM
// ============================================================================

/// Mock LLM that streams queued replies
#[derive(Default)]
pub struct MockLlm {
    replies: Mutex<VecDeque<Result<Vec<StreamChunk>, LlmError>>>,
    /// Record of all requests made
    requests: Mutex<Vec<LlmRequest>>,
    delay: Mutex<Option<Duration>>,
}

impl MockLlm {
    /// Queue a successful reply
    pub fn queue(&self, chunks: Vec<StreamChunk>) {
        self.replies.lock().unwrap().push_back(Ok(chunks));
    }

    /// Queue an error reply
    pub fn queue_error(&self, error: LlmError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    /// Wait this long before answering each request
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlm {
    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))?;
        Ok(Box::pin(futures::stream::iter(reply.into_iter().map(Ok))))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// Mock Tool Executor
// ============================================================================

type Failure = Box<dyn Fn() -> ToolError + Send + Sync>;

/// Mock tool executor with canned outputs for the standard tool names
pub struct MockTools {
    definitions: Vec<ToolDefinition>,
    failures: HashMap<String, Failure>,
    /// Record of tool executions
    calls: Mutex<Vec<ToolCall>>,
}

impl MockTools {
    pub fn standard() -> Self {
        Self {
            definitions: ToolRegistry::standard().definitions(),
            failures: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make every call to `name` fail with the produced error
    pub fn failing(
        mut self,
        name: &str,
        error: impl Fn() -> ToolError + Send + Sync + 'static,
    ) -> Self {
        self.failures.insert(name.to_string(), Box::new(error));
        self
    }

    /// Get recorded executions
    pub fn recorded_calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap().clone()
    }

    fn canned_output(call: &ToolCall) -> Option<Value> {
        let output = match call.name.as_str() {
            "calculator" => {
                let divisor = call.arguments["second_num"].as_f64().unwrap_or(1.0);
                if divisor == 0.0 {
                    json!(DIVIDE_BY_ZERO)
                } else {
                    json!(call.arguments["first_num"].as_f64().unwrap_or(0.0) / divisor)
                }
            }
            "get_joke" => json!({"setup": "Why?", "punchline": "Because."}),
            "get_random_fact" => json!("Octopuses have three hearts."),
            "get_current_time" => json!({"timezone": "UTC", "time": "2024-01-01 00:00:00"}),
            "get_weather" => json!({"city": "Oslo", "temperature": "3", "condition": "Snow"}),
            "web_search" => json!("Search summary"),
            "get_stock_price" => json!({"Global Quote": {}}),
            "convert_currency" => json!({"converted_amount": 1.0, "rate": 1.0}),
            _ => return None,
        };
        Some(output)
    }
}

#[async_trait]
impl ToolExecutor for MockTools {
    async fn execute(&self, call: &ToolCall, _thread_id: &str) -> Result<ToolOutput, ToolError> {
        self.calls.lock().unwrap().push(call.clone());

        if let Some(failure) = self.failures.get(&call.name) {
            return Err(failure());
        }
        Self::canned_output(call)
            .map(ToolOutput::json)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }
}

// ============================================================================
// In-memory checkpoint store
// ============================================================================

#[derive(Default)]
pub struct InMemoryStore {
    threads: Mutex<HashMap<String, Vec<Checkpoint>>>,
    fail_writes: Mutex<bool>,
}

impl InMemoryStore {
    /// Make every subsequent write fail
    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap() = fail;
    }

    pub fn checkpoints(&self, thread_id: &str) -> Vec<Checkpoint> {
        self.threads
            .lock()
            .unwrap()
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn latest(&self, thread_id: &str) -> Option<Checkpoint> {
        self.checkpoints(thread_id).pop()
    }

    pub fn latest_state(&self, thread_id: &str) -> ConversationState {
        self.latest(thread_id).map(|c| c.state).unwrap_or_default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStore {
    async fn put_checkpoint(
        &self,
        thread_id: &str,
        source: StepSource,
        next: Option<Node>,
        state: &ConversationState,
    ) -> Result<Checkpoint, String> {
        if *self.fail_writes.lock().unwrap() {
            return Err("disk full".to_string());
        }

        let mut threads = self.threads.lock().unwrap();
        let history = threads.entry(thread_id.to_string()).or_default();
        let parent = history.last();
        let checkpoint = Checkpoint {
            checkpoint_id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.to_string(),
            step: parent.map_or(0, |p| p.step + 1),
            parent_checkpoint_id: parent.map(|p| p.checkpoint_id.clone()),
            source,
            next,
            state: state.clone(),
            created_at: Utc::now(),
        };
        history.push(checkpoint.clone());
        Ok(checkpoint)
    }

    async fn latest_checkpoint(&self, thread_id: &str) -> Result<Option<Checkpoint>, String> {
        Ok(self.latest(thread_id))
    }
}
