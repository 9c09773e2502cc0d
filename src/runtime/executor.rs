//! Turn executor
//!
//! Feeds events into the pure graph transition and performs the effects it
//! returns: persistence, model calls and tool calls.

use super::traits::{CheckpointStore, ToolExecutor};
use crate::graph::{
    transition, ConversationState, Effect, Event, GraphContext, Message, ToolCall,
    TransitionError, TurnPhase,
};
use crate::llm::{ContentBlock, LlmError, LlmMessage, LlmRequest, LlmService, StreamChunk};
use crate::system_prompt::build_system_prompt;
use crate::tools::ToolError;
use chrono::Utc;
use futures::StreamExt;
use serde_json::Value;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;

/// Text of the synthetic result given to calls left open by an aborted turn
pub const INTERRUPTED_TOOL_RESULT: &str = "[Tool execution interrupted]";

/// Progress reported to the client while a turn runs
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// A piece of model output text
    Token { text: String },
    /// A tool call finished
    ToolResult { name: String, is_error: bool },
    /// The turn ended with this assistant text
    Done { message: String },
    /// The turn was aborted
    Error { kind: &'static str, message: String },
}

/// Errors that abort a turn
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Model request failed: {0}")]
    Llm(#[from] LlmError),
    #[error("Tool {name} failed: {source}")]
    Tool {
        name: String,
        #[source]
        source: ToolError,
    },
    #[error("Storage error: {0}")]
    Storage(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Thread {0} has no interrupted turn to resume")]
    NothingToResume(String),
}

impl TurnError {
    /// Stable identifier sent to clients
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Llm(_) => "llm",
            Self::Tool { .. } => "tool",
            Self::Storage(_) => "storage",
            Self::Transition(TransitionError::ToolRoundLimit { .. }) => "tool_round_limit",
            Self::Transition(
                TransitionError::InvalidTransition(_) | TransitionError::MismatchedToolResults,
            ) => "invalid_transition",
            Self::NothingToResume(_) => "nothing_to_resume",
        }
    }
}

/// Runs turns against a store, a model and a tool set
pub struct TurnExecutor<S, L, T> {
    store: S,
    llm: L,
    tools: T,
    max_tool_rounds: u32,
}

impl<S, L, T> TurnExecutor<S, L, T>
where
    S: CheckpointStore,
    L: LlmService,
    T: ToolExecutor,
{
    pub fn new(store: S, llm: L, tools: T, max_tool_rounds: u32) -> Self {
        Self {
            store,
            llm,
            tools,
            max_tool_rounds,
        }
    }

    /// Run one turn for a new user message.
    ///
    /// Returns the final assistant message; tokens and tool results are sent
    /// on `events` as they happen.
    pub async fn run_turn(
        &self,
        thread_id: &str,
        text: String,
        events: &mpsc::Sender<TurnEvent>,
    ) -> Result<Message, TurnError> {
        let mut state = self.load_state(thread_id).await?;

        let closed = state.close_pending_calls(INTERRUPTED_TOOL_RESULT);
        if closed > 0 {
            tracing::warn!(
                thread_id = %thread_id,
                count = closed,
                "Closed tool calls left pending by an interrupted turn"
            );
        }

        tracing::info!(thread_id = %thread_id, "Starting turn");
        self.drive(thread_id, state, Event::UserMessage { text }, events)
            .await
    }

    /// Continue a turn that stopped before reaching its end
    pub async fn resume(
        &self,
        thread_id: &str,
        events: &mpsc::Sender<TurnEvent>,
    ) -> Result<Message, TurnError> {
        let checkpoint = self
            .store
            .latest_checkpoint(thread_id)
            .await
            .map_err(TurnError::Storage)?;

        let Some((checkpoint, next)) = checkpoint.and_then(|cp| cp.next.map(|next| (cp, next)))
        else {
            return Err(TurnError::NothingToResume(thread_id.to_string()));
        };

        let pending = checkpoint.state.pending_tool_calls();
        tracing::info!(
            thread_id = %thread_id,
            step = checkpoint.step,
            next = %next,
            pending = pending.len(),
            "Resuming interrupted turn"
        );
        self.drive(thread_id, checkpoint.state, Event::Resume { next, pending }, events)
            .await
    }

    async fn load_state(&self, thread_id: &str) -> Result<ConversationState, TurnError> {
        let checkpoint = self
            .store
            .latest_checkpoint(thread_id)
            .await
            .map_err(TurnError::Storage)?;
        Ok(checkpoint.map(|cp| cp.state).unwrap_or_default())
    }

    async fn drive(
        &self,
        thread_id: &str,
        mut state: ConversationState,
        first: Event,
        events: &mpsc::Sender<TurnEvent>,
    ) -> Result<Message, TurnError> {
        let context = GraphContext::new(thread_id, self.max_tool_rounds);
        let mut phase = TurnPhase::Idle;
        let mut next_event = Some(first);
        let mut reply = None;

        while let Some(event) = next_event.take() {
            let result = transition(&phase, &context, event)?;
            phase = result.new_phase;

            for effect in result.effects {
                match effect {
                    Effect::Append(message) => state.push(message),
                    Effect::Checkpoint { source, next } => {
                        let checkpoint = self
                            .store
                            .put_checkpoint(thread_id, source, next, &state)
                            .await
                            .map_err(TurnError::Storage)?;
                        tracing::debug!(
                            thread_id = %thread_id,
                            step = checkpoint.step,
                            source = source.as_str(),
                            "Checkpoint written"
                        );
                    }
                    Effect::InvokeModel => {
                        let message = self.invoke_model(&state, events).await?;
                        next_event = Some(Event::ModelReplied { message });
                    }
                    Effect::ExecuteTools { calls } => {
                        let results = self.execute_tools(thread_id, &calls, events).await?;
                        next_event = Some(Event::ToolsCompleted { results });
                    }
                    Effect::Finish { message } => reply = Some(message),
                }
            }
        }

        reply.ok_or_else(|| {
            TurnError::Transition(TransitionError::InvalidTransition(
                "turn stopped without a reply".to_string(),
            ))
        })
    }

    /// Stream one model reply, forwarding text as it arrives
    async fn invoke_model(
        &self,
        state: &ConversationState,
        events: &mpsc::Sender<TurnEvent>,
    ) -> Result<Message, TurnError> {
        let request = LlmRequest {
            system: Some(build_system_prompt(Utc::now())),
            messages: build_llm_messages(&state.messages),
            tools: self.tools.definitions(),
            max_tokens: None,
        };

        let mut stream = self.llm.stream(&request).await?;
        let mut text = String::new();
        let mut calls = Vec::new();

        while let Some(chunk) = stream.next().await {
            match chunk? {
                StreamChunk::Text(piece) => {
                    text.push_str(&piece);
                    // A closed receiver means the client left; the turn still completes
                    let _ = events.send(TurnEvent::Token { text: piece }).await;
                }
                StreamChunk::ToolUse { id, name, input } => {
                    calls.push(ToolCall::new(id, name, input));
                }
                StreamChunk::Usage(_) | StreamChunk::Finish { .. } => {}
            }
        }

        if calls.is_empty() {
            Ok(Message::assistant(text))
        } else {
            Ok(Message::tool_request(text, calls))
        }
    }

    /// Run calls one at a time, in request order
    async fn execute_tools(
        &self,
        thread_id: &str,
        calls: &[ToolCall],
        events: &mpsc::Sender<TurnEvent>,
    ) -> Result<Vec<Message>, TurnError> {
        let mut results = Vec::with_capacity(calls.len());

        for call in calls {
            let start = Instant::now();
            let result = match self.tools.execute(call, thread_id).await {
                Ok(output) => Message::tool_result(call, output.content, false),
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(
                        thread_id = %thread_id,
                        tool = %call.name,
                        error = %e,
                        "Tool call rejected"
                    );
                    Message::tool_result(call, Value::String(e.to_string()), true)
                }
                Err(e) => {
                    tracing::error!(
                        thread_id = %thread_id,
                        tool = %call.name,
                        kind = e.kind(),
                        error = %e,
                        "Tool failed"
                    );
                    return Err(TurnError::Tool {
                        name: call.name.clone(),
                        source: e,
                    });
                }
            };

            let is_error = matches!(result, Message::ToolResult { is_error: true, .. });
            tracing::info!(
                thread_id = %thread_id,
                tool = %call.name,
                duration_ms = %start.elapsed().as_millis(),
                is_error,
                "Tool finished"
            );
            let _ = events
                .send(TurnEvent::ToolResult {
                    name: call.name.clone(),
                    is_error,
                })
                .await;
            results.push(result);
        }

        Ok(results)
    }
}

/// Convert conversation history into provider-neutral request messages
pub fn build_llm_messages(messages: &[Message]) -> Vec<LlmMessage> {
    messages
        .iter()
        .map(|message| match message {
            Message::User { content } => LlmMessage::user(vec![ContentBlock::text(content)]),
            Message::Assistant { content } => {
                LlmMessage::assistant(vec![ContentBlock::text(content)])
            }
            Message::ToolRequest {
                content,
                tool_calls,
            } => {
                let mut blocks = Vec::with_capacity(tool_calls.len() + 1);
                if !content.is_empty() {
                    blocks.push(ContentBlock::text(content));
                }
                blocks.extend(tool_calls.iter().map(|call| ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.arguments.clone(),
                }));
                LlmMessage::assistant(blocks)
            }
            // Tool results go in user message
            Message::ToolResult {
                tool_call_id,
                name,
                content,
                is_error,
            } => LlmMessage::user(vec![ContentBlock::ToolResult {
                tool_use_id: tool_call_id.clone(),
                name: name.clone(),
                content: content.clone(),
                is_error: *is_error,
            }]),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Node, StepSource};
    use crate::llm::MessageRole;
    use crate::runtime::testing::{
        collect_events, reply_text, reply_tools, InMemoryStore, MockLlm, MockTools,
    };
    use crate::tools::DIVIDE_BY_ZERO;
    use serde_json::json;
    use std::sync::Arc;

    type TestExecutor = TurnExecutor<Arc<InMemoryStore>, Arc<MockLlm>, Arc<MockTools>>;

    struct Harness {
        store: Arc<InMemoryStore>,
        llm: Arc<MockLlm>,
        tools: Arc<MockTools>,
        executor: TestExecutor,
    }

    fn harness(tools: MockTools, max_tool_rounds: u32) -> Harness {
        let store = Arc::new(InMemoryStore::default());
        let llm = Arc::new(MockLlm::default());
        let tools = Arc::new(tools);
        let executor = TurnExecutor::new(store.clone(), llm.clone(), tools.clone(), max_tool_rounds);
        Harness {
            store,
            llm,
            tools,
            executor,
        }
    }

    fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall::new(id, name, args)
    }

    #[tokio::test]
    async fn test_plain_reply_streams_and_checkpoints() {
        let h = harness(MockTools::standard(), 8);
        h.llm.queue(reply_text(&["Hel", "lo!"]));

        let (tx, rx) = mpsc::channel(64);
        let reply = h.executor.run_turn("t1", "Hi".into(), &tx).await.unwrap();
        drop(tx);

        assert_eq!(reply, Message::assistant("Hello!"));
        assert_eq!(
            collect_events(rx).await,
            vec![
                TurnEvent::Token { text: "Hel".into() },
                TurnEvent::Token { text: "lo!".into() },
            ]
        );

        let checkpoints = h.store.checkpoints("t1");
        let trail: Vec<(i64, StepSource, Option<Node>)> = checkpoints
            .iter()
            .map(|c| (c.step, c.source, c.next))
            .collect();
        assert_eq!(
            trail,
            vec![
                (0, StepSource::Input, Some(Node::Respond)),
                (1, StepSource::Respond, None),
            ]
        );
        assert_eq!(
            checkpoints[1].state.messages,
            vec![Message::user("Hi"), Message::assistant("Hello!")]
        );
    }

    #[tokio::test]
    async fn test_divide_by_zero_round_trip() {
        let h = harness(MockTools::standard(), 8);
        let division = call(
            "c1",
            "calculator",
            json!({"first_num": 12, "second_num": 0, "operation": "division"}),
        );
        h.llm.queue(reply_tools(vec![division.clone()]));
        h.llm.queue(reply_text(&["You can't divide by zero."]));

        let (tx, rx) = mpsc::channel(64);
        let reply = h
            .executor
            .run_turn("t1", "What is 12 / 0?".into(), &tx)
            .await
            .unwrap();
        drop(tx);

        assert_eq!(reply.text(), "You can't divide by zero.");
        let state = h.store.latest_state("t1");
        assert_eq!(
            state.messages,
            vec![
                Message::user("What is 12 / 0?"),
                Message::tool_request("", vec![division.clone()]),
                Message::tool_result(&division, json!(DIVIDE_BY_ZERO), false),
                Message::assistant("You can't divide by zero."),
            ]
        );
        assert!(collect_events(rx).await.contains(&TurnEvent::ToolResult {
            name: "calculator".into(),
            is_error: false
        }));

        // The second model request saw the tool result
        let requests = h.llm.recorded_requests();
        assert_eq!(requests.len(), 2);
        let last = requests[1].messages.last().unwrap();
        assert_eq!(last.role, MessageRole::User);
        assert!(matches!(
            &last.content[0],
            ContentBlock::ToolResult { name, .. } if name == "calculator"
        ));
    }

    #[tokio::test]
    async fn test_multiple_rounds_keep_request_order() {
        let h = harness(MockTools::standard(), 8);
        let round1 = vec![
            call("a", "get_joke", json!({})),
            call("b", "get_random_fact", json!({})),
        ];
        let round2 = vec![call("c", "get_current_time", json!({"timezone": "UTC"}))];
        h.llm.queue(reply_tools(round1));
        h.llm.queue(reply_tools(round2));
        h.llm.queue(reply_text(&["All done"]));

        let (tx, _rx) = mpsc::channel(64);
        h.executor.run_turn("t1", "go".into(), &tx).await.unwrap();

        let executed: Vec<String> = h.tools.recorded_calls().into_iter().map(|c| c.id).collect();
        assert_eq!(executed, vec!["a", "b", "c"]);

        let state = h.store.latest_state("t1");
        assert_eq!(state.tool_result_count(), 3);
        assert!(state.pending_tool_calls().is_empty());

        let steps: Vec<i64> = h.store.checkpoints("t1").iter().map(|c| c.step).collect();
        assert_eq!(steps, (0..6).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_tool_round_limit_aborts() {
        let h = harness(MockTools::standard(), 2);
        for i in 0..3 {
            h.llm
                .queue(reply_tools(vec![call(&format!("c{i}"), "get_joke", json!({}))]));
        }

        let (tx, _rx) = mpsc::channel(64);
        let err = h.executor.run_turn("t1", "loop".into(), &tx).await.unwrap_err();

        assert_eq!(err.kind(), "tool_round_limit");
        assert_eq!(h.tools.recorded_calls().len(), 2);
        // The rejected request was never appended
        let state = h.store.latest_state("t1");
        assert!(matches!(state.last(), Some(Message::ToolResult { .. })));
    }

    #[tokio::test]
    async fn test_fatal_tool_error_aborts_and_is_closed_next_turn() {
        let h = harness(
            MockTools::standard().failing("get_weather", || ToolError::Http {
                provider: "wttr.in",
                message: "timed out".into(),
            }),
            8,
        );
        let weather = call("w1", "get_weather", json!({"city": "Oslo"}));
        h.llm.queue(reply_tools(vec![weather.clone()]));

        let (tx, _rx) = mpsc::channel(64);
        let err = h
            .executor
            .run_turn("t1", "weather in Oslo?".into(), &tx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "tool");

        // The request is checkpointed with the call still open
        let latest = h.store.latest("t1").unwrap();
        assert_eq!(latest.next, Some(Node::Tools));
        assert_eq!(latest.state.pending_tool_calls(), vec![weather.clone()]);

        // Next user message closes it first
        h.llm.queue(reply_text(&["Sorry about that."]));
        h.executor.run_turn("t1", "never mind".into(), &tx).await.unwrap();

        let messages = h.store.latest_state("t1").messages;
        assert_eq!(
            messages[2],
            Message::tool_result(&weather, json!(INTERRUPTED_TOOL_RESULT), true)
        );
        assert_eq!(messages[3], Message::user("never mind"));
    }

    #[tokio::test]
    async fn test_recoverable_tool_error_becomes_result() {
        let h = harness(MockTools::standard(), 8);
        let bogus = call("x1", "launch_rocket", json!({}));
        h.llm.queue(reply_tools(vec![bogus.clone()]));
        h.llm.queue(reply_text(&["I can't do that."]));

        let (tx, rx) = mpsc::channel(64);
        h.executor.run_turn("t1", "launch".into(), &tx).await.unwrap();
        drop(tx);

        let state = h.store.latest_state("t1");
        match &state.messages[2] {
            Message::ToolResult {
                tool_call_id,
                is_error,
                ..
            } => {
                assert_eq!(tool_call_id, "x1");
                assert!(is_error);
            }
            other => panic!("Expected tool result, got {other:?}"),
        }
        assert!(collect_events(rx).await.contains(&TurnEvent::ToolResult {
            name: "launch_rocket".into(),
            is_error: true
        }));
    }

    #[tokio::test]
    async fn test_model_error_aborts_after_input_checkpoint() {
        let h = harness(MockTools::standard(), 8);
        h.llm.queue_error(LlmError::rate_limit("slow down"));

        let (tx, _rx) = mpsc::channel(64);
        let err = h.executor.run_turn("t1", "hi".into(), &tx).await.unwrap_err();

        assert_eq!(err.kind(), "llm");
        let latest = h.store.latest("t1").unwrap();
        assert_eq!(latest.source, StepSource::Input);
        assert_eq!(latest.next, Some(Node::Respond));
    }

    #[tokio::test]
    async fn test_resume_after_model_failure() {
        let h = harness(MockTools::standard(), 8);
        h.llm.queue_error(LlmError::server_error("overloaded"));
        let (tx, _rx) = mpsc::channel(64);
        h.executor.run_turn("t1", "hi".into(), &tx).await.unwrap_err();

        h.llm.queue(reply_text(&["Hello again"]));
        let reply = h.executor.resume("t1", &tx).await.unwrap();

        assert_eq!(reply, Message::assistant("Hello again"));
        assert_eq!(
            h.store.latest_state("t1").messages,
            vec![Message::user("hi"), Message::assistant("Hello again")]
        );
    }

    #[tokio::test]
    async fn test_resume_runs_pending_tools() {
        let h = harness(MockTools::standard(), 8);
        let joke = call("j1", "get_joke", json!({}));
        let state = ConversationState::new(vec![
            Message::user("joke"),
            Message::tool_request("", vec![joke.clone()]),
        ]);
        h.store
            .put_checkpoint("t1", StepSource::Respond, Some(Node::Tools), &state)
            .await
            .unwrap();
        h.llm.queue(reply_text(&["Here's one"]));

        let (tx, _rx) = mpsc::channel(64);
        h.executor.resume("t1", &tx).await.unwrap();

        assert_eq!(h.tools.recorded_calls(), vec![joke]);
        assert_eq!(h.store.latest("t1").unwrap().next, None);
    }

    #[tokio::test]
    async fn test_resume_finished_thread_fails() {
        let h = harness(MockTools::standard(), 8);
        let (tx, _rx) = mpsc::channel(64);

        let err = h.executor.resume("unknown", &tx).await.unwrap_err();
        assert_eq!(err.kind(), "nothing_to_resume");

        h.llm.queue(reply_text(&["done"]));
        h.executor.run_turn("t1", "hi".into(), &tx).await.unwrap();
        let err = h.executor.resume("t1", &tx).await.unwrap_err();
        assert!(matches!(err, TurnError::NothingToResume(ref id) if id == "t1"));
    }

    #[tokio::test]
    async fn test_storage_failure_aborts() {
        let h = harness(MockTools::standard(), 8);
        h.store.fail_writes(true);

        let (tx, _rx) = mpsc::channel(64);
        let err = h.executor.run_turn("t1", "hi".into(), &tx).await.unwrap_err();
        assert_eq!(err.kind(), "storage");
        assert!(h.llm.recorded_requests().is_empty());
    }

    #[tokio::test]
    async fn test_turn_completes_when_client_leaves() {
        let h = harness(MockTools::standard(), 8);
        h.llm.queue(reply_text(&["still ", "here"]));

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let reply = h.executor.run_turn("t1", "hi".into(), &tx).await.unwrap();
        assert_eq!(reply.text(), "still here");
    }

    #[test]
    fn test_build_llm_messages_shapes() {
        let c = call("c1", "get_joke", json!({}));
        let messages = build_llm_messages(&[
            Message::user("joke"),
            Message::tool_request("Let me find one.", vec![c.clone()]),
            Message::tool_result(&c, json!({"setup": "s", "punchline": "p"}), false),
            Message::assistant("s... p"),
        ]);

        let roles: Vec<MessageRole> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User,
                MessageRole::Assistant
            ]
        );
        assert_eq!(messages[1].content.len(), 2);
    }
}
