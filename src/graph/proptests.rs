//! Property-based tests for the conversation graph
//!
//! These tests drive the pure transition function through whole turns.

use super::state::*;
use super::transition::*;
use super::*;
use proptest::prelude::*;
use serde_json::json;

fn reply_with_calls(round: usize, count: usize) -> Message {
    let calls = (0..count)
        .map(|i| ToolCall::new(format!("r{round}-c{i}"), "get_joke", json!({})))
        .collect();
    Message::tool_request("", calls)
}

/// Run a turn where the model asks for `rounds[i]` tools in round `i` and
/// then answers. Returns the appended messages in order.
fn drive_turn(ctx: &GraphContext, rounds: &[usize]) -> Result<Vec<Message>, TransitionError> {
    let mut phase = TurnPhase::Idle;
    let mut history = Vec::new();
    let mut replies: Vec<Message> = rounds
        .iter()
        .enumerate()
        .map(|(i, &n)| reply_with_calls(i, n))
        .collect();
    replies.push(Message::assistant("done"));
    let mut replies = replies.into_iter();

    let mut next_event = Some(Event::UserMessage { text: "go".into() });
    while let Some(event) = next_event.take() {
        let result = transition(&phase, ctx, event)?;
        phase = result.new_phase;
        for effect in result.effects {
            match effect {
                Effect::Append(m) => history.push(m),
                Effect::InvokeModel => {
                    next_event = replies.next().map(|message| Event::ModelReplied { message });
                }
                Effect::ExecuteTools { calls } => {
                    let results = calls
                        .iter()
                        .map(|c| Message::tool_result(c, json!("ok"), false))
                        .collect();
                    next_event = Some(Event::ToolsCompleted { results });
                }
                Effect::Checkpoint { .. } | Effect::Finish { .. } => {}
            }
        }
    }
    assert_eq!(phase, TurnPhase::Complete);
    Ok(history)
}

proptest! {
    #[test]
    fn tool_results_follow_requests_in_order(rounds in prop::collection::vec(1usize..4, 0..6)) {
        let ctx = GraphContext::new("t", 8);
        let history = drive_turn(&ctx, &rounds).unwrap();

        let expected_results: usize = rounds.iter().sum();
        let state = ConversationState::new(history.clone());
        prop_assert_eq!(state.tool_result_count(), expected_results);
        prop_assert_eq!(history.last(), Some(&Message::assistant("done")));

        // Every result answers the request immediately before its block
        let mut expected_ids: Vec<String> = Vec::new();
        for message in &history {
            match message {
                Message::ToolRequest { tool_calls, .. } => {
                    prop_assert!(expected_ids.is_empty());
                    expected_ids = tool_calls.iter().rev().map(|c| c.id.clone()).collect();
                }
                Message::ToolResult { tool_call_id, .. } => {
                    prop_assert_eq!(Some(tool_call_id.clone()), expected_ids.pop());
                }
                Message::User { .. } | Message::Assistant { .. } => {
                    prop_assert!(expected_ids.is_empty());
                }
            }
        }
    }

    #[test]
    fn turns_beyond_the_limit_fail(limit in 0u32..5, extra in 1usize..3) {
        let ctx = GraphContext::new("t", limit);
        let rounds = vec![1usize; limit as usize + extra];
        let err = drive_turn(&ctx, &rounds).unwrap_err();
        prop_assert_eq!(err, TransitionError::ToolRoundLimit { limit });
    }
}
