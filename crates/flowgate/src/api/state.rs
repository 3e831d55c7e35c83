//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::AssistantBackend;
use crate::ws::{Relay, SessionRegistry};

/// Process-wide state, built once at startup and handed to the router.
#[derive(Clone)]
pub struct AppState {
    /// Live client sessions.
    pub registry: Arc<SessionRegistry>,
    /// Request dispatch and chat turns.
    pub relay: Arc<Relay>,
    /// WebSocket ping period; `None` disables keepalive pings.
    pub keepalive: Option<Duration>,
}

impl AppState {
    /// Create state around the backend chosen at startup.
    pub fn new(backend: Arc<dyn AssistantBackend>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let relay = Arc::new(Relay::new(registry.clone(), backend));
        Self {
            registry,
            relay,
            keepalive: None,
        }
    }

    pub fn with_keepalive(mut self, keepalive: Option<Duration>) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn backend_available(&self) -> bool {
        self.relay.backend_available()
    }
}
