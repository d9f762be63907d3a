//! LLM Client for the completion service
//!
//! Opens streaming chat completions against an OpenAI-compatible
//! `/chat/completions` endpoint and exposes the reply as a typed event stream.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::pin::Pin;
use tracing::{debug, error, info};

use crate::config::{ConnectionMode, RelayConfig};
use crate::error::{RelayError, RelayResult};
use crate::sse::{self, DONE_SENTINEL};

/// Role tag of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    Developer,
}

/// A chat message.
///
/// Fields other than `role` and `content` are kept as-is so caller messages
/// reach the completion service unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            extra: Map::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// One chunk of a streamed completion, kept as the exact JSON the service sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamEvent(pub Value);

/// Parameters of one streaming completion call
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

impl CompletionRequest {
    pub fn streaming(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
        }
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = RelayResult<StreamEvent>> + Send>>;

/// Anything that can stream chat completions
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short label for logs
    fn name(&self) -> &str;

    /// Open a streaming completion. Errors after the stream is open arrive as
    /// an `Err` item, after which the stream ends.
    async fn stream_chat(&self, request: CompletionRequest) -> RelayResult<EventStream>;
}

/// HTTP client bound to one connection mode
pub struct CompletionClient {
    client: Client,
    mode: ConnectionMode,
}

impl CompletionClient {
    pub fn new(mode: ConnectionMode, config: &RelayConfig) -> RelayResult<Self> {
        let client = Client::builder()
            .read_timeout(config.read_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self { client, mode })
    }

    /// Select the connection mode from configuration and build the client
    pub fn configure(config: &RelayConfig) -> RelayResult<Self> {
        let mode = match config.connection_mode() {
            Ok(mode) => mode,
            Err(e) => {
                error!("No OpenAI API token provided: {}", e);
                return Err(e);
            }
        };

        match &mode {
            ConnectionMode::Local { base_url } => {
                info!("Using local OpenAI-compatible API with no key: {}", base_url);
            }
            ConnectionMode::Hosted { base_url, .. } => {
                info!("Using OpenAI service with API token: {}", base_url);
            }
        }

        Self::new(mode, config)
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.mode.base_url().trim_end_matches('/')
        )
    }
}

#[async_trait]
impl CompletionBackend for CompletionClient {
    fn name(&self) -> &str {
        self.mode.label()
    }

    async fn stream_chat(&self, request: CompletionRequest) -> RelayResult<EventStream> {
        debug!(
            "Opening completion stream: model={}, messages={}",
            request.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(self.mode.credential())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::UpstreamStatus { status, body });
        }

        Ok(event_stream(sse::data_stream(response.bytes_stream())))
    }
}

/// Decode `data:` payloads into events until `[DONE]` or the first error
pub fn event_stream(mut data: sse::DataStream) -> EventStream {
    Box::pin(async_stream::stream! {
        while let Some(item) = data.next().await {
            let payload = match item {
                Ok(payload) => payload,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            if payload.trim() == DONE_SENTINEL {
                return;
            }

            match parse_event(&payload) {
                Ok(event) => yield Ok(event),
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
    })
}

/// Parse one payload. An `{"error": ...}` object from the service is an error.
pub fn parse_event(payload: &str) -> RelayResult<StreamEvent> {
    let value: Value = serde_json::from_str(payload)?;

    if let Some(err) = value.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Err(RelayError::Upstream(message));
    }

    Ok(StreamEvent(value))
}
