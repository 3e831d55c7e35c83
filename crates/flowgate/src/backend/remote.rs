//! Backend that talks to an assistant agent over WebSocket.
//!
//! One connection per chat turn. The agent speaks a small JSON protocol:
//!
//! ```text
//! gateway ── {"type":"session_open", permission_mode, auto_start_process, session_id} ──▶ agent
//! gateway ── {"type":"user_message", text} ─────────────────────────────────────────────▶ agent
//! gateway ◀── {"type":"assistant", text}
//!             {"type":"tool_call", id, label, description, status}
//!             {"type":"plan", title, entries: [{content, status}]}
//!             {"type":"task_finish"}
//! ```
//!
//! If the agent is not listening and auto-start is allowed, the configured
//! command is spawned and the connect is retried until the startup timeout.
//! The spawned process belongs to the backend, not to the turn that started
//! it: every later turn shares it, and it is killed when the backend drops.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use flowgate_protocol::{PermissionMode, PlanTask};

use super::{
    AssistantBackend, BackendError, BackendEvent, BackendOptions, BackendResult, BackendSession,
};

type AgentSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Where the agent lives and how to start it.
#[derive(Debug, Clone)]
pub struct RemoteBackendConfig {
    /// WebSocket URL of the agent, e.g. `ws://127.0.0.1:8090/acp`.
    pub url: String,
    /// Program and arguments that start the agent. `None` disables auto-start.
    pub command: Option<Vec<String>>,
    /// How long to wait for a freshly started agent to accept connections.
    pub startup_timeout: Duration,
}

/// Backend connected to a real assistant agent.
#[derive(Debug)]
pub struct RemoteBackend {
    config: RemoteBackendConfig,
    /// Agent process started by this backend. Held locked while starting so
    /// concurrent turns never spawn a second copy.
    agent: Mutex<Option<Child>>,
}

impl RemoteBackend {
    pub fn new(config: RemoteBackendConfig) -> Self {
        Self {
            config,
            agent: Mutex::new(None),
        }
    }

    async fn connect(&self, options: &BackendOptions) -> BackendResult<AgentSocket> {
        let err = match connect_async(self.config.url.as_str()).await {
            Ok((socket, _)) => return Ok(socket),
            Err(err) => err,
        };

        let command = match &self.config.command {
            Some(command) if options.auto_start_process && !command.is_empty() => command,
            _ => {
                return Err(BackendError::Connect {
                    url: self.config.url.clone(),
                    source: err,
                });
            }
        };

        debug!("Agent not reachable at {}: {}", self.config.url, err);
        let mut agent = self.agent.lock().await;
        if agent_running(&mut agent) {
            debug!("Agent process already started; waiting for it to listen");
        } else {
            *agent = Some(spawn_agent(command)?);
        }
        self.wait_for_agent().await
    }

    async fn wait_for_agent(&self) -> BackendResult<AgentSocket> {
        let start = tokio::time::Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match connect_async(self.config.url.as_str()).await {
                Ok((socket, _)) => {
                    info!(
                        "Connected to agent at {} after {} attempts",
                        self.config.url, attempts
                    );
                    return Ok(socket);
                }
                Err(err) => {
                    if start.elapsed() >= self.config.startup_timeout {
                        warn!("Agent still unreachable: {}", err);
                        return Err(BackendError::StartupTimeout {
                            url: self.config.url.clone(),
                            attempts,
                        });
                    }
                    let backoff = Duration::from_millis(u64::from(attempts.min(20)) * 100);
                    debug!(
                        "Agent not ready yet (attempt {}): {}; retrying in {:?}",
                        attempts, err, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

fn agent_running(agent: &mut Option<Child>) -> bool {
    match agent.as_mut().map(Child::try_wait) {
        Some(Ok(None)) => true,
        Some(Ok(Some(status))) => {
            info!("Agent process exited ({})", status);
            false
        }
        Some(Err(e)) => {
            warn!("Failed to poll agent process: {}", e);
            false
        }
        None => false,
    }
}

fn spawn_agent(command: &[String]) -> BackendResult<Child> {
    let display = command.join(" ");
    let (program, args) = command.split_first().ok_or_else(|| BackendError::Spawn {
        command: display.clone(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
    })?;

    info!("Starting agent process: {}", display);
    Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| BackendError::Spawn {
            command: display,
            source,
        })
}

#[async_trait]
impl AssistantBackend for RemoteBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn open_session(&self, options: BackendOptions) -> BackendResult<Box<dyn BackendSession>> {
        let socket = self.connect(&options).await?;
        let mut session = RemoteSession {
            socket: Some(socket),
            finished: false,
        };

        let open = AgentRequest::SessionOpen {
            permission_mode: options.permission_mode,
            auto_start_process: options.auto_start_process,
            session_id: options.session_id.as_deref(),
        };
        if let Err(err) = session.send(&open).await {
            let _ = session.close().await;
            return Err(err);
        }

        debug!(
            "Opened agent session at {} (mode {})",
            self.config.url, options.permission_mode
        );
        Ok(Box::new(session))
    }
}

struct RemoteSession {
    socket: Option<AgentSocket>,
    finished: bool,
}

impl RemoteSession {
    async fn send(&mut self, request: &AgentRequest<'_>) -> BackendResult<()> {
        let socket = self.socket.as_mut().ok_or(BackendError::Closed)?;
        let json = serde_json::to_string(request)
            .map_err(|e| BackendError::Protocol(format!("encoding request: {e}")))?;
        socket.send(Message::Text(json.into())).await?;
        Ok(())
    }
}

#[async_trait]
impl BackendSession for RemoteSession {
    async fn send_message(&mut self, text: &str) -> BackendResult<()> {
        self.send(&AgentRequest::UserMessage { text }).await
    }

    async fn next_event(&mut self) -> BackendResult<Option<BackendEvent>> {
        loop {
            if self.finished {
                return Ok(None);
            }
            let socket = self.socket.as_mut().ok_or(BackendError::Closed)?;

            let Some(msg) = socket.next().await else {
                self.finished = true;
                return Ok(None);
            };

            match msg? {
                Message::Text(text) => {
                    if let Some(event) = decode_event(text.as_str())? {
                        if event == BackendEvent::TaskFinish {
                            self.finished = true;
                        }
                        return Ok(Some(event));
                    }
                }
                Message::Close(_) => {
                    self.finished = true;
                    return Ok(None);
                }
                Message::Binary(_) => {
                    return Err(BackendError::Protocol(
                        "unexpected binary frame".to_string(),
                    ));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> BackendResult<()> {
        self.finished = true;

        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close(None).await {
                debug!("Agent socket close: {}", e);
            }
        }

        Ok(())
    }
}

// ============================================================================
// Agent wire format
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AgentRequest<'a> {
    SessionOpen {
        permission_mode: PermissionMode,
        auto_start_process: bool,
        session_id: Option<&'a str>,
    },
    UserMessage {
        text: &'a str,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AgentMessage {
    Assistant {
        text: String,
    },
    ToolCall {
        id: String,
        #[serde(default)]
        label: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        status: String,
    },
    Plan {
        #[serde(default)]
        title: String,
        #[serde(default)]
        entries: Vec<PlanEntry>,
    },
    TaskFinish {},
}

#[derive(Debug, Deserialize)]
struct PlanEntry {
    content: String,
    #[serde(default)]
    status: String,
}

const AGENT_MESSAGE_TYPES: [&str; 4] = ["assistant", "tool_call", "plan", "task_finish"];

/// Decode one agent frame. Frames of unknown type yield `None`.
fn decode_event(text: &str) -> BackendResult<Option<BackendEvent>> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| BackendError::Protocol(format!("invalid JSON: {e}")))?;

    let Some(kind) = value.get("type").and_then(Value::as_str).map(str::to_owned) else {
        return Err(BackendError::Protocol("event without type".to_string()));
    };
    if !AGENT_MESSAGE_TYPES.contains(&kind.as_str()) {
        debug!("Skipping agent event of type {}", kind);
        return Ok(None);
    }

    let message: AgentMessage = serde_json::from_value(value)
        .map_err(|e| BackendError::Protocol(format!("{kind} event: {e}")))?;

    let event = match message {
        AgentMessage::Assistant { text } => BackendEvent::AssistantChunk { text },
        AgentMessage::ToolCall {
            id,
            label,
            description,
            status,
        } => BackendEvent::ToolCall {
            id,
            label,
            description,
            status,
        },
        AgentMessage::Plan { title, entries } => BackendEvent::Plan {
            title,
            tasks: entries
                .into_iter()
                .map(|entry| PlanTask {
                    content: entry.content,
                    status: entry.status,
                })
                .collect(),
        },
        AgentMessage::TaskFinish {} => BackendEvent::TaskFinish,
    };
    Ok(Some(event))
}
