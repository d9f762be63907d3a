//! Chat Relay Server
//!
//! Architecture:
//! ```text
//! Browser ── POST /chat ──▶ chat_handler ──▶ ClientHandle ──▶ completion service
//!    ▲                                                              │
//!    └──────────── NDJSON, one line per event ◀─────────────────────┘
//! ```
//!
//! Key invariants:
//! - The client is created before the listener accepts requests
//! - The client is released only after in-flight streams drain
//! - Requests without a client fail with 503 before any streaming

use crate::client_handle::ClientHandle;
use crate::config::{RelayConfig, AUTH_TOKEN_ENV, LOCAL_ENDPOINT_ENV};
use crate::error::RelayError;
use crate::llm_client::CompletionRequest;
use crate::relay::{build_messages, relay_chat, ChatRequest, NDJSON_CONTENT_TYPE};
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::header,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Largest accepted `POST /chat` body. Conversations are forwarded whole and
/// the completion service decides whether they fit.
pub const MAX_CHAT_BODY_BYTES: usize = 16 * 1024 * 1024;

// ============================================================================
// SERVER STATE
// ============================================================================

pub struct RelayState {
    pub client: ClientHandle,
    pub model: String,
}

impl RelayState {
    pub fn new(client: ClientHandle, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Configure the completion client from `config`. A missing credential
    /// leaves the client unconfigured instead of failing startup.
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(ClientHandle::from_config(config), config.model.clone())
    }
}

// ============================================================================
// ENDPOINTS
// ============================================================================

/// GET / - Landing page
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn health_check() -> &'static str {
    "OK"
}

/// POST /chat - Relay a conversation and stream the completion back
///
/// Body: `{"messages": [{"role": "...", "content": "..."}, ...]}`
///
/// Errors before streaming map to HTTP status codes (400 malformed body,
/// 503 no client). Once streaming starts the status is 200 and upstream
/// failures arrive as a final `{"error": "..."}` line.
pub async fn chat_handler(
    State(state): State<Arc<RelayState>>,
    body: Bytes,
) -> Result<Response, RelayError> {
    let request = ChatRequest::from_slice(&body).inspect_err(|e| {
        warn!("Rejecting chat request: {}", e);
    })?;

    let backend = state.client.acquire().inspect_err(|e| {
        error!("Rejecting chat request: {}", e);
    })?;

    let messages = build_messages(request.messages);
    info!(
        "Relaying chat: {} messages, model={}, backend={}",
        messages.len(),
        state.model,
        backend.name()
    );

    let completion = CompletionRequest::streaming(state.model.clone(), messages);
    let body = Body::from_stream(relay_chat(backend, completion));

    Ok(([(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)], body).into_response())
}

// ============================================================================
// SERVER STARTUP
// ============================================================================

pub fn build_router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/chat", post(chat_handler))
        .layer(DefaultBodyLimit::max(MAX_CHAT_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve until `shutdown` resolves, wait for in-flight requests, then
/// release the completion client.
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<RelayState>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(Arc::clone(&state));

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    state.client.release();
    result?;

    Ok(())
}

pub async fn run_server(config: RelayConfig, host: &str, port: u16) -> anyhow::Result<()> {
    let state = Arc::new(RelayState::from_config(&config));

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;

    let mode = match state.client.acquire() {
        Ok(client) => client.name().to_string(),
        Err(_) => "unconfigured".to_string(),
    };

    info!("╔══════════════════════════════════════════════════════════════╗");
    info!("║                   Chat Relay - Streaming                     ║");
    info!("╠══════════════════════════════════════════════════════════════╣");
    info!("║  Completion:   {:44} ║", mode);
    info!("║  Model:        {:44} ║", state.model);
    info!("║  Listening on: {:44} ║", addr);
    info!("╠══════════════════════════════════════════════════════════════╣");
    info!("║  Endpoints:                                                  ║");
    info!("║    GET  /        - Landing page                              ║");
    info!("║    GET  /health  - Health check                              ║");
    info!("║    POST /chat    - Stream a chat completion (NDJSON)         ║");
    info!("╚══════════════════════════════════════════════════════════════╝");

    if !state.client.is_ready() {
        warn!(
            "Set {} or {} to enable chat; POST /chat answers 503 until then",
            LOCAL_ENDPOINT_ENV, AUTH_TOKEN_ENV
        );
    }

    serve(listener, state, shutdown_signal()).await?;

    info!("Stopped.");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
