//! Events that drive the conversation graph

use super::state::{Message, Node, ToolCall};

/// Events that trigger phase transitions
#[derive(Debug, Clone)]
pub enum Event {
    /// A user submission starts a turn
    UserMessage { text: String },

    /// Continue a thread from its latest checkpoint
    Resume {
        next: Node,
        /// Calls still waiting on results (only used when `next` is `Tools`)
        pending: Vec<ToolCall>,
    },

    /// The model finished streaming a reply
    ModelReplied { message: Message },

    /// Every call from the last tool request has a result, in request order
    ToolsCompleted { results: Vec<Message> },
}
