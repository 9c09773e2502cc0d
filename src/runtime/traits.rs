//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::db::{Checkpoint, Database};
use crate::graph::{ConversationState, Node, StepSource, ToolCall};
use crate::llm::{LlmError, LlmRequest, LlmService, LlmStream, ToolDefinition};
#[cfg(test)]
use crate::llm::LlmResponse;
use crate::tools::{ToolContext, ToolError, ToolOutput, ToolRegistry, ToolsConfig};
use async_trait::async_trait;
use std::sync::Arc;

/// Storage for thread checkpoints
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Append a checkpoint after a completed step
    async fn put_checkpoint(
        &self,
        thread_id: &str,
        source: StepSource,
        next: Option<Node>,
        state: &ConversationState,
    ) -> Result<Checkpoint, String>;

    /// Get the most recent checkpoint of a thread
    async fn latest_checkpoint(&self, thread_id: &str) -> Result<Option<Checkpoint>, String>;
}

/// Executor for tools
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute one tool call on behalf of a thread
    async fn execute(&self, call: &ToolCall, thread_id: &str) -> Result<ToolOutput, ToolError>;

    /// Get tool definitions for LLM
    fn definitions(&self) -> Vec<ToolDefinition>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: CheckpointStore + ?Sized> CheckpointStore for Arc<T> {
    async fn put_checkpoint(
        &self,
        thread_id: &str,
        source: StepSource,
        next: Option<Node>,
        state: &ConversationState,
    ) -> Result<Checkpoint, String> {
        (**self).put_checkpoint(thread_id, source, next, state).await
    }

    async fn latest_checkpoint(&self, thread_id: &str) -> Result<Option<Checkpoint>, String> {
        (**self).latest_checkpoint(thread_id).await
    }
}

#[async_trait]
impl<T: LlmService + ?Sized> LlmService for Arc<T> {
    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        (**self).stream(request).await
    }

    #[cfg(test)]
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        (**self).complete(request).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

#[async_trait]
impl<T: ToolExecutor + ?Sized> ToolExecutor for Arc<T> {
    async fn execute(&self, call: &ToolCall, thread_id: &str) -> Result<ToolOutput, ToolError> {
        (**self).execute(call, thread_id).await
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        (**self).definitions()
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as a checkpoint store
#[derive(Clone)]
pub struct DatabaseStore {
    db: Database,
}

impl DatabaseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CheckpointStore for DatabaseStore {
    async fn put_checkpoint(
        &self,
        thread_id: &str,
        source: StepSource,
        next: Option<Node>,
        state: &ConversationState,
    ) -> Result<Checkpoint, String> {
        self.db
            .put_checkpoint(thread_id, source, next, state)
            .map_err(|e| e.to_string())
    }

    async fn latest_checkpoint(&self, thread_id: &str) -> Result<Option<Checkpoint>, String> {
        self.db
            .latest_checkpoint(thread_id)
            .map_err(|e| e.to_string())
    }
}

/// Adapter to use ToolRegistry as ToolExecutor
pub struct ToolRegistryExecutor {
    registry: ToolRegistry,
    http: reqwest::Client,
    config: Arc<ToolsConfig>,
}

impl ToolRegistryExecutor {
    pub fn new(registry: ToolRegistry, http: reqwest::Client, config: ToolsConfig) -> Self {
        Self {
            registry,
            http,
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistryExecutor {
    async fn execute(&self, call: &ToolCall, thread_id: &str) -> Result<ToolOutput, ToolError> {
        let ctx = ToolContext::new(self.http.clone(), thread_id, self.config.clone());
        self.registry.execute(call, ctx).await
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }
}
