//! Chat Relay
//!
//! Accepts a conversation from a browser client, forwards it to an
//! OpenAI-compatible completion service, and streams the model's incremental
//! reply back as newline-delimited JSON.
//!
//! ## Module Structure
//!
//! - `config`: environment settings and connection mode selection
//! - `error`: error taxonomy and its HTTP mapping
//! - `sse`: server-sent events decoding
//! - `llm_client`: streaming completion client
//! - `client_handle`: completion client lifecycle (startup to shutdown)
//! - `relay`: message construction and NDJSON relay loop
//! - `server`: HTTP surface and serving lifecycle

pub mod client_handle;
pub mod config;
pub mod error;
pub mod llm_client;
pub mod relay;
pub mod server;
pub mod sse;

pub use client_handle::ClientHandle;
pub use config::{ConnectionMode, RelayConfig, DEFAULT_MODEL};
pub use error::{RelayError, RelayResult};
pub use llm_client::{
    ChatMessage, CompletionBackend, CompletionClient, CompletionRequest, EventStream, Role,
    StreamEvent,
};
pub use relay::{build_messages, relay_chat, ChatRequest, SYSTEM_PROMPT};
pub use server::{build_router, run_server, serve, RelayState, MAX_CHAT_BODY_BYTES};
