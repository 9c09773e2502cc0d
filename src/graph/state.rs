//! Conversation state types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

// ============================================================================
// Tool Call - A tool invocation requested by the model
// ============================================================================

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

/// A single turn in a conversation.
///
/// Routing decisions match on the variant; there is no runtime type
/// inspection anywhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    User {
        content: String,
    },
    Assistant {
        content: String,
    },
    /// Model output that asks for one or more tools to run
    ToolRequest {
        #[serde(default)]
        content: String,
        tool_calls: Vec<ToolCall>,
    },
    ToolResult {
        tool_call_id: String,
        name: String,
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: content.into(),
        }
    }

    pub fn tool_request(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::ToolRequest {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn tool_result(call: &ToolCall, content: Value, is_error: bool) -> Self {
        Message::ToolResult {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            content,
            is_error,
        }
    }

    /// Tool calls this message asks for (empty for every other variant)
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::ToolRequest { tool_calls, .. } => tool_calls,
            Message::User { .. } | Message::Assistant { .. } | Message::ToolResult { .. } => &[],
        }
    }

    /// Text shown to the user for this message
    pub fn text(&self) -> String {
        match self {
            Message::User { content }
            | Message::Assistant { content }
            | Message::ToolRequest { content, .. } => content.clone(),
            Message::ToolResult { content, .. } => render_value(content),
        }
    }
}

/// Render a tool result value as plain text (strings unquoted)
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Conversation State
// ============================================================================

/// Ordered, append-only message history of one thread
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl ConversationState {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Calls from the most recent tool request that have no result yet
    pub fn pending_tool_calls(&self) -> Vec<ToolCall> {
        let Some(request_idx) = self
            .messages
            .iter()
            .rposition(|m| matches!(m, Message::ToolRequest { .. }))
        else {
            return Vec::new();
        };

        let answered: HashSet<&str> = self.messages[request_idx + 1..]
            .iter()
            .filter_map(|m| match m {
                Message::ToolResult { tool_call_id, .. } => Some(tool_call_id.as_str()),
                Message::User { .. } | Message::Assistant { .. } | Message::ToolRequest { .. } => {
                    None
                }
            })
            .collect();

        self.messages[request_idx]
            .tool_calls()
            .iter()
            .filter(|call| !answered.contains(call.id.as_str()))
            .cloned()
            .collect()
    }

    /// Append a synthetic error result for every pending call.
    ///
    /// Returns the number of results appended.
    pub fn close_pending_calls(&mut self, reason: &str) -> usize {
        let pending = self.pending_tool_calls();
        for call in &pending {
            self.push(Message::tool_result(
                call,
                Value::String(reason.to_string()),
                true,
            ));
        }
        pending.len()
    }

    /// Number of tool result messages in the history
    #[cfg(test)]
    pub fn tool_result_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| matches!(m, Message::ToolResult { .. }))
            .count()
    }
}

// ============================================================================
// Graph nodes
// ============================================================================

/// Nodes of the conversation graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Respond,
    Tools,
}

impl Node {
    pub fn as_str(self) -> &'static str {
        match self {
            Node::Respond => "respond",
            Node::Tools => "tools",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "respond" => Some(Node::Respond),
            "tools" => Some(Node::Tools),
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which step produced a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepSource {
    /// New user input entered the graph
    Input,
    Respond,
    Tools,
}

impl StepSource {
    pub fn as_str(self) -> &'static str {
        match self {
            StepSource::Input => "input",
            StepSource::Respond => "respond",
            StepSource::Tools => "tools",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "input" => Some(StepSource::Input),
            "respond" => Some(StepSource::Respond),
            "tools" => Some(StepSource::Tools),
            _ => None,
        }
    }
}

// ============================================================================
// Turn phase
// ============================================================================

/// Where a turn currently is in the Respond/ToolExec cycle
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TurnPhase {
    /// No turn in progress
    #[default]
    Idle,

    /// Waiting on the model; `round` counts completed tool round-trips
    Responding { round: u32 },

    /// Running the calls from the last model reply, one at a time
    ExecutingTools { round: u32, calls: Vec<ToolCall> },

    /// The model answered without requesting tools
    Complete,
}

/// Immutable configuration for a turn
#[derive(Debug, Clone)]
pub struct GraphContext {
    pub thread_id: String,
    pub max_tool_rounds: u32,
}

/// Default ceiling on tool round-trips per turn
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 8;

impl GraphContext {
    pub fn new(thread_id: impl Into<String>, max_tool_rounds: u32) -> Self {
        Self {
            thread_id: thread_id.into(),
            max_tool_rounds,
        }
    }
}
