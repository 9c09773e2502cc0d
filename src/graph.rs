//! Conversation graph
//!
//! Two nodes, Respond and Tools, wired as a cycle with a conditional edge
//! after Respond. The transition function is pure; the runtime executes
//! the effects it returns.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{
    render_value, ConversationState, GraphContext, Message, Node, StepSource, ToolCall, TurnPhase,
    DEFAULT_MAX_TOOL_ROUNDS,
};
pub use transition::{transition, TransitionError};
