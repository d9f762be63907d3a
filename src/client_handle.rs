//! Client Handle lifecycle
//!
//! Owns the single completion client from startup to shutdown. Handlers
//! acquire a shared reference per request; the slot itself is only written
//! when the client is installed or released.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use crate::llm_client::{CompletionBackend, CompletionClient};

enum Slot {
    /// Configuration failed or nothing installed yet
    Unconfigured,
    Ready(Arc<dyn CompletionBackend>),
    /// Shut down; never reused
    Released,
}

pub struct ClientHandle {
    slot: RwLock<Slot>,
}

impl Default for ClientHandle {
    fn default() -> Self {
        Self::unconfigured()
    }
}

impl ClientHandle {
    pub fn unconfigured() -> Self {
        Self {
            slot: RwLock::new(Slot::Unconfigured),
        }
    }

    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            slot: RwLock::new(Slot::Ready(backend)),
        }
    }

    /// Configure the completion client. On failure the handle stays
    /// unconfigured and every chat request is rejected.
    pub fn from_config(config: &RelayConfig) -> Self {
        let handle = Self::unconfigured();
        match CompletionClient::configure(config) {
            Ok(client) => {
                handle.install(Arc::new(client));
            }
            Err(e) => {
                error!("Completion client not created, chat requests will fail: {}", e);
            }
        }
        handle
    }

    /// Install a client into an unconfigured handle. Returns false if a client
    /// is already installed or the handle was released.
    pub fn install(&self, backend: Arc<dyn CompletionBackend>) -> bool {
        let mut slot = self.slot.write();
        match *slot {
            Slot::Unconfigured => {
                info!("Completion client installed ({})", backend.name());
                *slot = Slot::Ready(backend);
                true
            }
            Slot::Ready(_) => {
                warn!("Completion client already installed, keeping the existing one");
                false
            }
            Slot::Released => {
                warn!("Completion client already released, refusing to install");
                false
            }
        }
    }

    /// Shared reference to the client for one request
    pub fn acquire(&self) -> RelayResult<Arc<dyn CompletionBackend>> {
        match &*self.slot.read() {
            Slot::Ready(backend) => Ok(Arc::clone(backend)),
            Slot::Unconfigured | Slot::Released => Err(RelayError::ServiceUnavailable),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.slot.read(), Slot::Ready(_))
    }

    /// Drop the client and its connection pool. Requests still holding a
    /// reference finish first. Returns false if nothing was released.
    pub fn release(&self) -> bool {
        let previous = std::mem::replace(&mut *self.slot.write(), Slot::Released);
        match previous {
            Slot::Ready(backend) => {
                info!("Completion client released ({})", backend.name());
                true
            }
            Slot::Unconfigured => {
                debug!("No completion client to release");
                false
            }
            Slot::Released => {
                debug!("Completion client already released");
                false
            }
        }
    }
}
