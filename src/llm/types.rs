//! Common types for LLM interactions

use super::LlmError;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;

/// LLM request
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub messages: Vec<LlmMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: Option<u32>,
}

/// Message in conversation
#[derive(Debug, Clone, PartialEq)]
pub struct LlmMessage {
    pub role: MessageRole,
    pub content: Vec<ContentBlock>,
}

impl LlmMessage {
    pub fn user(content: Vec<ContentBlock>) -> Self {
        Self {
            role: MessageRole::User,
            content,
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content,
        }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

/// Content block in a message
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        /// Tool name; some providers key responses by name rather than id
        name: String,
        content: Value,
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        ContentBlock::Text { text: s.into() }
    }
}

/// Tool definition
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Whether the schema declares any properties
    pub fn takes_arguments(&self) -> bool {
        self.input_schema
            .get("properties")
            .and_then(Value::as_object)
            .is_some_and(|props| !props.is_empty())
    }
}

/// Incremental piece of a streamed model reply
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    Usage(Usage),
    Finish {
        reason: String,
    },
}

/// Boxed stream of reply chunks
pub type LlmStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, LlmError>> + Send>>;

/// LLM response collected from a stream
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub end_turn: bool,
    pub usage: Usage,
}

#[cfg(test)]
impl LlmResponse {
    /// Extract all tool use requests from the response
    pub fn tool_uses(&self) -> Vec<(&str, &str, &Value)> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                ContentBlock::Text { .. } | ContentBlock::ToolResult { .. } => None,
            })
            .collect()
    }

    /// Get text content from the response
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::ToolUse { .. } | ContentBlock::ToolResult { .. } => None,
            })
            .collect()
    }
}

/// Usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Drain a chunk stream into a complete response.
///
/// Adjacent text chunks are merged into one block.
#[cfg(test)]
pub async fn collect_stream(mut stream: LlmStream) -> Result<LlmResponse, LlmError> {
    use futures::StreamExt;

    let mut response = LlmResponse::default();

    while let Some(chunk) = stream.next().await {
        match chunk? {
            StreamChunk::Text(text) => {
                if let Some(ContentBlock::Text { text: last }) = response.content.last_mut() {
                    last.push_str(&text);
                } else {
                    response.content.push(ContentBlock::Text { text });
                }
            }
            StreamChunk::ToolUse { id, name, input } => {
                response
                    .content
                    .push(ContentBlock::ToolUse { id, name, input });
            }
            StreamChunk::Usage(usage) => response.usage = usage,
            StreamChunk::Finish { reason } => response.end_turn = reason == "STOP",
        }
    }

    Ok(response)
}
