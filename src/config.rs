//! Relay Configuration
//!
//! Environment-driven settings for the completion service:
//! - Connection mode (local unauthenticated endpoint or hosted bearer token)
//! - Model identifier
//! - Upstream timeouts

use crate::error::{RelayError, RelayResult};
use std::fmt;
use std::time::Duration;

/// Selects unauthenticated local mode (e.g. a llamafile server)
pub const LOCAL_ENDPOINT_ENV: &str = "LOCAL_OPENAI_ENDPOINT";
/// Bearer token for the hosted service
pub const AUTH_TOKEN_ENV: &str = "OPENAI_AUTH_TOKEN";
/// Model (deployment) identifier
pub const MODEL_ENV: &str = "AZURE_OPENAI_CHATGPT_DEPLOYMENT";
/// Hosted base URL override
pub const HOSTED_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
/// Upstream idle timeout in seconds (longest wait for the next bytes)
pub const TIMEOUT_ENV: &str = "RELAY_UPSTREAM_TIMEOUT_SECS";

/// Placeholder credential sent to local endpoints
pub const LOCAL_PLACEHOLDER_KEY: &str = "no-key-required";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_HOSTED_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// How the relay reaches the completion service
#[derive(Clone, PartialEq, Eq)]
pub enum ConnectionMode {
    /// OpenAI-compatible server that needs no key
    Local { base_url: String },
    /// Hosted service authenticated with a bearer token
    Hosted { base_url: String, token: String },
}

impl ConnectionMode {
    pub fn base_url(&self) -> &str {
        match self {
            Self::Local { base_url } | Self::Hosted { base_url, .. } => base_url,
        }
    }

    /// Credential sent in the `Authorization` header
    pub fn credential(&self) -> &str {
        match self {
            Self::Local { .. } => LOCAL_PLACEHOLDER_KEY,
            Self::Hosted { token, .. } => token,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::Hosted { .. } => "hosted",
        }
    }
}

// Never print the token
impl fmt::Debug for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { base_url } => f
                .debug_struct("Local")
                .field("base_url", base_url)
                .finish(),
            Self::Hosted { base_url, .. } => f
                .debug_struct("Hosted")
                .field("base_url", base_url)
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// Complete relay configuration
#[derive(Clone)]
pub struct RelayConfig {
    /// Local endpoint URL (selects local mode when set)
    pub local_endpoint: Option<String>,
    /// Hosted bearer token (used when no local endpoint is set)
    pub auth_token: Option<String>,
    /// Hosted base URL
    pub hosted_base_url: String,
    /// Model identifier sent with every completion request
    pub model: String,
    /// Longest wait for the next bytes from the service. A stream that keeps
    /// producing events is never cut off.
    pub read_timeout: Duration,
    /// Upstream connect timeout
    pub connect_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            local_endpoint: None,
            auth_token: None,
            hosted_base_url: DEFAULT_HOSTED_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            read_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("local_endpoint", &self.local_endpoint)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("hosted_base_url", &self.hosted_base_url)
            .field("model", &self.model)
            .field("read_timeout", &self.read_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl RelayConfig {
    /// Read the configuration from process environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset. An unparsable timeout falls back to
    /// the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            local_endpoint: get(LOCAL_ENDPOINT_ENV),
            auth_token: get(AUTH_TOKEN_ENV),
            hosted_base_url: get(HOSTED_BASE_URL_ENV).unwrap_or(defaults.hosted_base_url),
            model: get(MODEL_ENV).unwrap_or(defaults.model),
            read_timeout: get(TIMEOUT_ENV)
                .and_then(|v| v.trim().parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.read_timeout),
            connect_timeout: defaults.connect_timeout,
        }
    }

    /// Pick the connection mode. A local endpoint wins over a token.
    pub fn connection_mode(&self) -> RelayResult<ConnectionMode> {
        if let Some(base_url) = &self.local_endpoint {
            return Ok(ConnectionMode::Local {
                base_url: base_url.clone(),
            });
        }

        match &self.auth_token {
            Some(token) => Ok(ConnectionMode::Hosted {
                base_url: self.hosted_base_url.clone(),
                token: token.clone(),
            }),
            None => Err(RelayError::ConfigurationMissing),
        }
    }
}
