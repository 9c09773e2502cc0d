//! Server-sent event decoding for streaming providers

use super::LlmError;
use futures::{Stream, StreamExt};
use std::fmt::Display;

const EVENT_DELIMITER: &str = "\n\n";

/// Incremental SSE decoder.
///
/// Bytes may arrive split anywhere, including inside a multi-byte UTF-8
/// sequence or between the `\r` and `\n` of a line ending.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: String,
    utf8_buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed bytes and return the data payload of every completed event
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.utf8_buffer.extend_from_slice(bytes);
        self.decode_utf8();

        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut payloads = Vec::new();
        while let Some(event) = self.next_event() {
            payloads.extend(event_data(&event));
        }
        payloads
    }

    /// Move decodable bytes into the text buffer.
    ///
    /// Invalid sequences become U+FFFD; only an incomplete trailing sequence
    /// is held back for the next push.
    fn decode_utf8(&mut self) {
        loop {
            match std::str::from_utf8(&self.utf8_buffer) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.utf8_buffer.clear();
                    return;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&self.utf8_buffer[..valid_up_to]));
                    match err.error_len() {
                        Some(invalid) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.utf8_buffer.drain(..valid_up_to + invalid);
                        }
                        None => {
                            self.utf8_buffer.drain(..valid_up_to);
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Payload of a trailing event that was never terminated
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        event_data(&rest)
    }

    fn next_event(&mut self) -> Option<String> {
        let pos = self.buffer.find(EVENT_DELIMITER)?;
        Some(self.buffer.drain(..pos + EVENT_DELIMITER.len()).collect())
    }
}

/// Joined `data:` lines of one event; comments and other fields are dropped
fn event_data(event: &str) -> Option<String> {
    let lines: Vec<&str> = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();

    if lines.is_empty() {
        return None;
    }
    let data = lines.join("\n");
    if data.trim().is_empty() || data.trim() == "[DONE]" {
        return None;
    }
    Some(data)
}

/// Turn a byte stream into a stream of SSE data payloads
pub(crate) fn sse_data_stream<S, B, E>(body: S) -> impl Stream<Item = Result<String, LlmError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    futures::stream::unfold(
        (Box::pin(body), SseDecoder::default(), false),
        |(mut body, mut decoder, done)| async move {
            if done {
                return None;
            }
            let (items, done): (Vec<Result<String, LlmError>>, bool) = match body.next().await {
                Some(Ok(bytes)) => (decoder.push(bytes.as_ref()).into_iter().map(Ok).collect(), false),
                Some(Err(e)) => (
                    vec![Err(LlmError::network(format!("Stream read failed: {e}")))],
                    true,
                ),
                None => (decoder.finish().into_iter().map(Ok).collect(), true),
            };
            Some((items, (body, decoder, done)))
        },
    )
    .flat_map(futures::stream::iter)
}
