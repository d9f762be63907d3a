//! Chat relay
//!
//! Turns a caller conversation into a streaming completion call and the
//! resulting event stream into newline-delimited JSON:
//! - one line per upstream event, in arrival order
//! - on the first upstream error, one `{"error": "..."}` line, then the end
//!
//! The body stream is lazy: the next upstream event is only requested once
//! the previous line has been taken by the transport.

use axum::body::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::error::{RelayError, RelayResult};
use crate::llm_client::{ChatMessage, CompletionBackend, CompletionRequest};

/// Instruction prepended to every conversation
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

pub type NdjsonStream = Pin<Box<dyn Stream<Item = Result<Bytes, Infallible>> + Send>>;

/// Body of `POST /chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn from_slice(body: &[u8]) -> RelayResult<Self> {
        serde_json::from_slice(body).map_err(|e| RelayError::MalformedRequest(e.to_string()))
    }
}

/// System instruction first, then the caller's messages untouched.
///
/// History is not trimmed; an oversized conversation is rejected upstream
/// and reported in-band.
pub fn build_messages(request_messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut all_messages = Vec::with_capacity(request_messages.len() + 1);
    all_messages.push(ChatMessage::system(SYSTEM_PROMPT));
    all_messages.extend(request_messages);
    all_messages
}

/// Compact JSON plus `\n`. Non-ASCII text is written as UTF-8, not escaped.
pub fn encode_line<T: Serialize>(value: &T) -> Result<Bytes, serde_json::Error> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}

/// Terminal `{"error": "..."}` record
pub fn error_line(message: &str) -> Bytes {
    encode_line(&serde_json::json!({ "error": message }))
        .unwrap_or_else(|_| Bytes::from_static(b"{\"error\":\"unknown error\"}\n"))
}

/// Logs when the body is dropped before the relay finished, which means the
/// client went away and the upstream call was cancelled with it.
struct DisconnectGuard {
    finished: bool,
    forwarded: usize,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.finished {
            info!(
                "Client disconnected after {} events, upstream stream cancelled",
                self.forwarded
            );
        }
    }
}

/// Open the completion stream and relay it as NDJSON
pub fn relay_chat(
    backend: Arc<dyn CompletionBackend>,
    request: CompletionRequest,
) -> NdjsonStream {
    Box::pin(async_stream::stream! {
        let mut guard = DisconnectGuard { finished: false, forwarded: 0 };

        let mut events = match backend.stream_chat(request).await {
            Ok(events) => events,
            Err(e) => {
                error!("Completion request failed: {}", e);
                guard.finished = true;
                yield Ok::<_, Infallible>(error_line(&e.to_string()));
                return;
            }
        };

        while let Some(item) = events.next().await {
            let line = item.and_then(|event| {
                debug!("Forwarding event: {}", event.0);
                encode_line(&event).map_err(RelayError::from)
            });

            match line {
                Ok(line) => {
                    guard.forwarded += 1;
                    yield Ok(line);
                }
                Err(e) => {
                    error!("Completion stream failed after {} events: {}", guard.forwarded, e);
                    guard.finished = true;
                    yield Ok(error_line(&e.to_string()));
                    return;
                }
            }
        }

        debug!("Completion stream finished: {} events", guard.forwarded);
        guard.finished = true;
    })
}
