//! Server-Sent Events for turn progress

use crate::runtime::TurnEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// Stream turn events until the turn's channel closes
pub fn turn_stream(
    rx: mpsc::Receiver<TurnEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = ReceiverStream::new(rx).map(|event| Ok(turn_event_to_axum(event)));

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn turn_event_to_axum(event: TurnEvent) -> Event {
    let (event_type, data) = match event {
        TurnEvent::Token { text } => ("token", json!({ "text": text })),
        TurnEvent::ToolResult { name, is_error } => (
            "tool_result",
            json!({
                "name": name,
                "is_error": is_error
            }),
        ),
        TurnEvent::Done { message } => ("done", json!({ "message": message })),
        TurnEvent::Error { kind, message } => (
            "error",
            json!({
                "kind": kind,
                "message": message
            }),
        ),
    };

    Event::default().event(event_type).data(data.to_string())
}
