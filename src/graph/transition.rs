//! Pure phase transition function
//!
//! Given the same phase, context and event this always produces the same
//! phase and effects. All I/O happens in the executor.

use super::{Effect, Event, GraphContext, Message, Node, StepSource, TurnPhase};
use thiserror::Error;

/// Result of a phase transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_phase: TurnPhase,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(phase: TurnPhase) -> Self {
        Self {
            new_phase: phase,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("Tool round limit reached: the model requested tools after {limit} round-trips")]
    ToolRoundLimit { limit: u32 },
    #[error("Tool results do not match the requested calls")]
    MismatchedToolResults,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
pub fn transition(
    phase: &TurnPhase,
    context: &GraphContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (phase, event) {
        // ============================================================
        // Start -> Respond
        // ============================================================
        (TurnPhase::Idle, Event::UserMessage { text }) => {
            Ok(TransitionResult::new(TurnPhase::Responding { round: 0 }).with_effects([
                Effect::Append(Message::user(text)),
                Effect::checkpoint(StepSource::Input, Some(Node::Respond)),
                Effect::InvokeModel,
            ]))
        }

        (TurnPhase::Idle, Event::Resume { next: Node::Respond, .. }) => {
            Ok(TransitionResult::new(TurnPhase::Responding { round: 0 })
                .with_effect(Effect::InvokeModel))
        }

        (TurnPhase::Idle, Event::Resume { next: Node::Tools, pending }) => {
            if pending.is_empty() {
                return Ok(TransitionResult::new(TurnPhase::Responding { round: 0 })
                    .with_effect(Effect::InvokeModel));
            }
            Ok(TransitionResult::new(TurnPhase::ExecutingTools {
                round: 1,
                calls: pending.clone(),
            })
            .with_effect(Effect::execute_tools(pending)))
        }

        // ============================================================
        // Respond -> {ToolExec, End}
        // ============================================================
        (TurnPhase::Responding { round }, Event::ModelReplied { message }) => match &message {
            Message::Assistant { .. } => Ok(TransitionResult::new(TurnPhase::Complete)
                .with_effects([
                    Effect::Append(message.clone()),
                    Effect::checkpoint(StepSource::Respond, None),
                    Effect::Finish { message },
                ])),
            Message::ToolRequest { tool_calls, .. } if tool_calls.is_empty() => {
                Ok(TransitionResult::new(TurnPhase::Complete).with_effects([
                    Effect::Append(message.clone()),
                    Effect::checkpoint(StepSource::Respond, None),
                    Effect::Finish { message },
                ]))
            }
            Message::ToolRequest { tool_calls, .. } => {
                if *round >= context.max_tool_rounds {
                    return Err(TransitionError::ToolRoundLimit {
                        limit: context.max_tool_rounds,
                    });
                }
                let calls = tool_calls.clone();
                Ok(TransitionResult::new(TurnPhase::ExecutingTools {
                    round: round + 1,
                    calls: calls.clone(),
                })
                .with_effects([
                    Effect::Append(message),
                    Effect::checkpoint(StepSource::Respond, Some(Node::Tools)),
                    Effect::execute_tools(calls),
                ]))
            }
            Message::User { .. } | Message::ToolResult { .. } => Err(
                TransitionError::InvalidTransition("model reply must come from the assistant".into()),
            ),
        },

        // ============================================================
        // ToolExec -> Respond
        // ============================================================
        (TurnPhase::ExecutingTools { round, calls }, Event::ToolsCompleted { results }) => {
            if !results_match_calls(calls, &results) {
                return Err(TransitionError::MismatchedToolResults);
            }
            Ok(TransitionResult::new(TurnPhase::Responding { round: *round })
                .with_effects(results.into_iter().map(Effect::Append))
                .with_effects([
                    Effect::checkpoint(StepSource::Tools, Some(Node::Respond)),
                    Effect::InvokeModel,
                ]))
        }

        // ============================================================
        // Everything else is a bug in the caller
        // ============================================================
        (phase, event) => Err(TransitionError::InvalidTransition(format!(
            "{} cannot handle {}",
            phase_name(phase),
            event_name(&event)
        ))),
    }
}

fn results_match_calls(calls: &[super::ToolCall], results: &[Message]) -> bool {
    calls.len() == results.len()
        && calls.iter().zip(results).all(|(call, result)| match result {
            Message::ToolResult { tool_call_id, .. } => *tool_call_id == call.id,
            Message::User { .. } | Message::Assistant { .. } | Message::ToolRequest { .. } => false,
        })
}

fn phase_name(phase: &TurnPhase) -> &'static str {
    match phase {
        TurnPhase::Idle => "idle",
        TurnPhase::Responding { .. } => "responding",
        TurnPhase::ExecutingTools { .. } => "executing_tools",
        TurnPhase::Complete => "complete",
    }
}

fn event_name(event: &Event) -> &'static str {
    match event {
        Event::UserMessage { .. } => "user_message",
        Event::Resume { .. } => "resume",
        Event::ModelReplied { .. } => "model_replied",
        Event::ToolsCompleted { .. } => "tools_completed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ToolCall;
    use serde_json::json;

    fn ctx() -> GraphContext {
        GraphContext::new("thread-1", 3)
    }

    fn calc_call(id: &str) -> ToolCall {
        ToolCall::new(
            id,
            "calculator",
            json!({"first_num": 12, "second_num": 0, "operation": "division"}),
        )
    }

    #[test]
    fn test_user_message_enters_respond() {
        let result = transition(
            &TurnPhase::Idle,
            &ctx(),
            Event::UserMessage {
                text: "hello".into(),
            },
        )
        .unwrap();

        assert_eq!(result.new_phase, TurnPhase::Responding { round: 0 });
        assert_eq!(
            result.effects,
            vec![
                Effect::Append(Message::user("hello")),
                Effect::checkpoint(StepSource::Input, Some(Node::Respond)),
                Effect::InvokeModel,
            ]
        );
    }

    #[test]
    fn test_reply_without_tools_ends_turn() {
        let reply = Message::assistant("Hi!");
        let result = transition(
            &TurnPhase::Responding { round: 0 },
            &ctx(),
            Event::ModelReplied {
                message: reply.clone(),
            },
        )
        .unwrap();

        assert_eq!(result.new_phase, TurnPhase::Complete);
        assert!(result
            .effects
            .contains(&Effect::checkpoint(StepSource::Respond, None)));
        assert_eq!(
            result.effects.last(),
            Some(&Effect::Finish { message: reply })
        );
    }

    #[test]
    fn test_reply_with_tools_routes_to_tool_exec() {
        let reply = Message::tool_request("", vec![calc_call("c1")]);
        let result = transition(
            &TurnPhase::Responding { round: 0 },
            &ctx(),
            Event::ModelReplied { message: reply },
        )
        .unwrap();

        assert_eq!(
            result.new_phase,
            TurnPhase::ExecutingTools {
                round: 1,
                calls: vec![calc_call("c1")]
            }
        );
        assert_eq!(
            result.effects[1],
            Effect::checkpoint(StepSource::Respond, Some(Node::Tools))
        );
        assert_eq!(
            result.effects[2],
            Effect::execute_tools(vec![calc_call("c1")])
        );
    }

    #[test]
    fn test_tools_completed_returns_to_respond() {
        let call = calc_call("c1");
        let results = vec![Message::tool_result(&call, json!("Error: Cannot divide by zero"), false)];
        let result = transition(
            &TurnPhase::ExecutingTools {
                round: 1,
                calls: vec![call],
            },
            &ctx(),
            Event::ToolsCompleted {
                results: results.clone(),
            },
        )
        .unwrap();

        assert_eq!(result.new_phase, TurnPhase::Responding { round: 1 });
        assert_eq!(result.effects[0], Effect::Append(results[0].clone()));
        assert_eq!(
            result.effects[1],
            Effect::checkpoint(StepSource::Tools, Some(Node::Respond))
        );
        assert_eq!(result.effects[2], Effect::InvokeModel);
    }

    #[test]
    fn test_tool_round_limit_is_enforced() {
        let reply = Message::tool_request("", vec![calc_call("c9")]);
        let err = transition(
            &TurnPhase::Responding { round: 3 },
            &ctx(),
            Event::ModelReplied { message: reply },
        )
        .unwrap_err();

        assert_eq!(err, TransitionError::ToolRoundLimit { limit: 3 });
    }

    #[test]
    fn test_mismatched_results_rejected() {
        let result = transition(
            &TurnPhase::ExecutingTools {
                round: 1,
                calls: vec![calc_call("c1"), calc_call("c2")],
            },
            &ctx(),
            Event::ToolsCompleted {
                results: vec![Message::tool_result(&calc_call("c2"), json!(1), false)],
            },
        );
        assert_eq!(result.unwrap_err(), TransitionError::MismatchedToolResults);
    }

    #[test]
    fn test_resume_from_tools_executes_pending() {
        let result = transition(
            &TurnPhase::Idle,
            &ctx(),
            Event::Resume {
                next: Node::Tools,
                pending: vec![calc_call("c1")],
            },
        )
        .unwrap();

        assert_eq!(
            result.effects,
            vec![Effect::execute_tools(vec![calc_call("c1")])]
        );
    }

    #[test]
    fn test_user_message_while_responding_is_invalid() {
        let result = transition(
            &TurnPhase::Responding { round: 0 },
            &ctx(),
            Event::UserMessage { text: "again".into() },
        );
        assert!(matches!(
            result,
            Err(TransitionError::InvalidTransition(_))
        ));
    }
}
