//! Assistant backends - one interface over the real agent and the demo stand-in.
//!
//! The relay never checks whether an assistant is installed. A backend is
//! chosen once at startup and handed to the relay as `Arc<dyn AssistantBackend>`.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 Event Relay                  │
//! │  open_session → send_message → next_event*   │
//! │               → close                        │
//! └──────────────────────┬───────────────────────┘
//!                        │
//!          ┌─────────────┴─────────────┐
//!          ▼                           ▼
//! ┌───────────────────┐      ┌───────────────────┐
//! │  RemoteBackend    │      │ SimulatedBackend  │
//! │  (agent over WS)  │      │ (canned stream)   │
//! └───────────────────┘      └───────────────────┘
//! ```

mod remote;
mod simulated;

pub use remote::{RemoteBackend, RemoteBackendConfig};
pub use simulated::{SimulatedBackend, SimulationTiming, simulated_reply};

use std::sync::Arc;

use async_trait::async_trait;
use flowgate_protocol::{PermissionMode, PlanTask, SessionConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Options for opening one backend session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOptions {
    pub permission_mode: PermissionMode,
    pub auto_start_process: bool,
    pub session_id: Option<String>,
}

impl From<&SessionConfig> for BackendOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            permission_mode: config.permission_mode(),
            auto_start_process: config.auto_start_process,
            session_id: config.session_id.clone(),
        }
    }
}

/// Events a backend produces during one chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    AssistantChunk {
        text: String,
    },
    ToolCall {
        id: String,
        label: String,
        description: String,
        status: String,
    },
    Plan {
        title: String,
        tasks: Vec<PlanTask>,
    },
    TaskFinish,
}

/// Backend failures. All of them end the current chat turn.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to connect to assistant at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("failed to start assistant process `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("assistant not reachable at {url} after {attempts} attempts")]
    StartupTimeout { url: String, attempts: u32 },

    #[error("assistant transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed assistant event: {0}")]
    Protocol(String),

    #[error("assistant session is closed")]
    Closed,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// An assistant that can run chat turns.
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether a real assistant is behind this backend.
    fn is_available(&self) -> bool;

    /// Open a session scoped to one chat turn.
    async fn open_session(&self, options: BackendOptions) -> BackendResult<Box<dyn BackendSession>>;
}

/// A backend session owned by exactly one chat turn.
#[async_trait]
pub trait BackendSession: Send {
    /// Submit the user's text.
    async fn send_message(&mut self, text: &str) -> BackendResult<()>;

    /// Next event of the turn, in arrival order. `None` ends the sequence.
    async fn next_event(&mut self) -> BackendResult<Option<BackendEvent>>;

    /// Release the session. Safe to call more than once.
    async fn close(&mut self) -> BackendResult<()>;
}

/// Which backend to run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Remote when a URL is configured, simulated otherwise.
    #[default]
    Auto,
    /// Always talk to the configured agent.
    Remote,
    /// Always use the canned demo stream.
    Simulated,
}

impl std::fmt::Display for BackendMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendMode::Auto => write!(f, "auto"),
            BackendMode::Remote => write!(f, "remote"),
            BackendMode::Simulated => write!(f, "simulated"),
        }
    }
}

/// Pick the backend for this process.
pub fn select_backend(
    mode: BackendMode,
    remote: Option<RemoteBackendConfig>,
    timing: SimulationTiming,
) -> anyhow::Result<Arc<dyn AssistantBackend>> {
    match (mode, remote) {
        (BackendMode::Simulated, _) | (BackendMode::Auto, None) => {
            Ok(Arc::new(SimulatedBackend::new(timing)))
        }
        (BackendMode::Remote | BackendMode::Auto, Some(config)) => {
            Ok(Arc::new(RemoteBackend::new(config)))
        }
        (BackendMode::Remote, None) => {
            anyhow::bail!("backend.mode is \"remote\" but backend.url is not set")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_config() -> RemoteBackendConfig {
        RemoteBackendConfig {
            url: "ws://127.0.0.1:8090/acp".to_string(),
            command: None,
            startup_timeout: std::time::Duration::from_secs(1),
        }
    }

    #[test]
    fn test_options_resolve_permission_mode() {
        let config = SessionConfig {
            permission_mode: "confirm".to_string(),
            auto_start_process: false,
            session_id: Some("s-9".to_string()),
        };
        let options = BackendOptions::from(&config);
        assert_eq!(options.permission_mode, PermissionMode::Confirm);
        assert!(!options.auto_start_process);
        assert_eq!(options.session_id.as_deref(), Some("s-9"));

        let fallback = BackendOptions::from(&SessionConfig {
            permission_mode: "bogus".to_string(),
            ..Default::default()
        });
        assert_eq!(fallback.permission_mode, PermissionMode::Auto);
    }

    #[test]
    fn test_select_backend() {
        let timing = SimulationTiming::instant();

        let sim = select_backend(BackendMode::Auto, None, timing).unwrap();
        assert_eq!(sim.name(), "simulated");
        assert!(!sim.is_available());

        let remote = select_backend(BackendMode::Auto, Some(remote_config()), timing).unwrap();
        assert_eq!(remote.name(), "remote");
        assert!(remote.is_available());

        let forced = select_backend(BackendMode::Simulated, Some(remote_config()), timing).unwrap();
        assert_eq!(forced.name(), "simulated");

        assert!(select_backend(BackendMode::Remote, None, timing).is_err());
    }
}
