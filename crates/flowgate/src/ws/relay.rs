//! Event relay: turns client requests into outbound frames.
//!
//! Chat turns are driven through the configured [`AssistantBackend`]; every
//! other request is answered directly. Frames go out through the registry,
//! so a session that disappears mid-turn simply stops receiving them.

use std::sync::Arc;

use log::{debug, info, warn};

use flowgate_protocol::{ClientRequest, ConfigOverride, ServerEvent, parse_request};

use super::registry::{Delivery, SessionRegistry};
use crate::backend::{AssistantBackend, BackendEvent, BackendOptions, BackendResult, BackendSession};

/// Dispatches client requests for every session.
pub struct Relay {
    registry: Arc<SessionRegistry>,
    backend: Arc<dyn AssistantBackend>,
}

impl Relay {
    pub fn new(registry: Arc<SessionRegistry>, backend: Arc<dyn AssistantBackend>) -> Self {
        Self { registry, backend }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn backend_available(&self) -> bool {
        self.backend.is_available()
    }

    /// Send the `connection` frame that opens every session.
    pub async fn greet(&self, client_id: &str) -> Delivery {
        self.registry
            .send(
                client_id,
                ServerEvent::connected(client_id, self.backend_available()),
            )
            .await
    }

    /// Handle one raw text frame from a client.
    pub async fn handle_text(&self, client_id: &str, text: &str) {
        match parse_request(text) {
            Ok(request) => self.dispatch(client_id, request).await,
            Err(e) => {
                warn!("Rejected frame from client {}: {}", client_id, e);
                self.registry.send_error(client_id, e.to_string()).await;
            }
        }
    }

    /// Handle one parsed request.
    pub async fn dispatch(&self, client_id: &str, request: ClientRequest) {
        debug!("Client {} sent {}", client_id, request.tag());

        match request {
            ClientRequest::Chat { message, config } => {
                self.chat(client_id, message, config.unwrap_or_default())
                    .await;
            }

            ClientRequest::Config { config } => {
                self.registry.set_config(client_id, config.clone());
                self.registry
                    .send(client_id, ServerEvent::ConfigUpdated { config })
                    .await;
            }

            // Acknowledged only; the decision is not forwarded to the backend.
            ClientRequest::ToolResponse { tool_id, approved } => {
                self.registry
                    .send(
                        client_id,
                        ServerEvent::ToolResponseReceived { tool_id, approved },
                    )
                    .await;
            }

            ClientRequest::Ping {} => {
                self.registry.send(client_id, ServerEvent::Pong {}).await;
            }
        }
    }

    async fn chat(&self, client_id: &str, message: String, overrides: ConfigOverride) {
        self.registry
            .send(
                client_id,
                ServerEvent::MessageReceived {
                    message: message.clone(),
                },
            )
            .await;

        if let Err(e) = self.run_turn(client_id, &message, &overrides).await {
            warn!(
                "Chat turn for client {} failed on {} backend: {}",
                client_id,
                self.backend.name(),
                e
            );
            self.registry
                .send_error(client_id, format!("error processing message: {e}"))
                .await;
        }
    }

    async fn run_turn(
        &self,
        client_id: &str,
        message: &str,
        overrides: &ConfigOverride,
    ) -> BackendResult<()> {
        let config = self.registry.config(client_id).with_override(overrides);
        let options = BackendOptions::from(&config);

        let mut session = self.backend.open_session(options).await?;
        let outcome = self.stream_turn(client_id, session.as_mut(), message).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close backend session for {}: {}", client_id, e);
        }
        outcome
    }

    async fn stream_turn(
        &self,
        client_id: &str,
        session: &mut dyn BackendSession,
        message: &str,
    ) -> BackendResult<()> {
        session.send_message(message).await?;

        let mut forwarded = 0usize;
        while let Some(event) = session.next_event().await? {
            let finished = event == BackendEvent::TaskFinish;
            self.registry.send(client_id, server_event(event)).await;
            forwarded += 1;

            if finished {
                info!(
                    "Chat turn for client {} finished after {} events",
                    client_id, forwarded
                );
                return Ok(());
            }
        }

        debug!(
            "Backend stream for client {} ended without task_finish ({} events)",
            client_id, forwarded
        );
        Ok(())
    }
}

fn server_event(event: BackendEvent) -> ServerEvent {
    match event {
        BackendEvent::AssistantChunk { text } => ServerEvent::AssistantChunk { content: text },
        BackendEvent::ToolCall {
            id,
            label,
            description,
            status,
        } => ServerEvent::ToolCall {
            tool_id: id,
            label,
            description,
            status,
        },
        BackendEvent::Plan { title, tasks } => ServerEvent::Plan { title, tasks },
        BackendEvent::TaskFinish => ServerEvent::TaskFinish {},
    }
}
