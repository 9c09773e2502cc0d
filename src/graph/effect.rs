//! Effects produced by phase transitions

use super::state::{Message, Node, StepSource, ToolCall};

/// Effects to be executed after a transition, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append a message to the turn's history
    Append(Message),

    /// Write a checkpoint of the current history
    Checkpoint {
        source: StepSource,
        /// Node that runs next; `None` ends the turn
        next: Option<Node>,
    },

    /// Stream a reply from the model
    InvokeModel,

    /// Run tool calls sequentially
    ExecuteTools { calls: Vec<ToolCall> },

    /// The turn is complete
    Finish { message: Message },
}

impl Effect {
    pub fn checkpoint(source: StepSource, next: Option<Node>) -> Self {
        Effect::Checkpoint { source, next }
    }

    pub fn execute_tools(calls: Vec<ToolCall>) -> Self {
        Effect::ExecuteTools { calls }
    }
}
