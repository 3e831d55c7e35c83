//! Server -> client event frames.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::SessionConfig;

/// One frame pushed to a client: an event plus the time it was produced.
///
/// Serialized flat, e.g. `{"type":"pong","timestamp":"2025-01-01T00:00:00Z"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundFrame {
    #[serde(flatten)]
    pub event: ServerEvent,
    pub timestamp: DateTime<Utc>,
}

impl OutboundFrame {
    /// Stamp an event with the current time.
    pub fn now(event: ServerEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }

    /// The wire tag of the wrapped event.
    pub fn tag(&self) -> &'static str {
        self.event.tag()
    }
}

impl From<ServerEvent> for OutboundFrame {
    fn from(event: ServerEvent) -> Self {
        Self::now(event)
    }
}

/// Events the gateway sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    // ========== Connection Events ==========
    /// Session admitted. Always the first frame on a connection.
    Connection {
        status: String,
        client_id: String,
        backend_available: bool,
    },

    /// Reply to a `ping` request.
    Pong {},

    /// Something went wrong; the session stays open.
    Error { message: String },

    // ========== Chat Turn Events ==========
    /// Echo of the user's chat text, sent before the turn starts.
    MessageReceived { message: String },

    /// Streamed piece of assistant text.
    AssistantChunk { content: String },

    /// The assistant wants to run a tool.
    ToolCall {
        tool_id: String,
        label: String,
        description: String,
        status: String,
    },

    /// The assistant's current plan.
    Plan { title: String, tasks: Vec<PlanTask> },

    /// The chat turn is complete.
    TaskFinish {},

    // ========== Acknowledgements ==========
    /// The session configuration was replaced.
    ConfigUpdated { config: SessionConfig },

    /// A tool decision was received.
    ToolResponseReceived {
        tool_id: Option<String>,
        approved: bool,
    },
}

impl ServerEvent {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Pong {} => "pong",
            Self::Error { .. } => "error",
            Self::MessageReceived { .. } => "message_received",
            Self::AssistantChunk { .. } => "assistant_chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::Plan { .. } => "plan",
            Self::TaskFinish {} => "task_finish",
            Self::ConfigUpdated { .. } => "config_updated",
            Self::ToolResponseReceived { .. } => "tool_response_received",
        }
    }

    pub fn connected(client_id: impl Into<String>, backend_available: bool) -> Self {
        Self::Connection {
            status: "connected".to_string(),
            client_id: client_id.into(),
            backend_available,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// One entry of a plan, in the order the backend produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanTask {
    pub content: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed(event: ServerEvent) -> OutboundFrame {
        OutboundFrame {
            event,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_frames_are_flat_with_timestamp() {
        let value = serde_json::to_value(fixed(ServerEvent::connected("c1", false))).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "connection",
                "status": "connected",
                "client_id": "c1",
                "backend_available": false,
                "timestamp": "2025-03-01T12:00:00Z",
            })
        );
    }

    #[test]
    fn test_empty_events_still_carry_type_and_timestamp() {
        let pong = serde_json::to_value(fixed(ServerEvent::Pong {})).unwrap();
        assert_eq!(pong, json!({"type": "pong", "timestamp": "2025-03-01T12:00:00Z"}));

        let finish = serde_json::to_value(fixed(ServerEvent::TaskFinish {})).unwrap();
        assert_eq!(finish["type"], "task_finish");
        assert_eq!(finish.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_plan_preserves_task_order() {
        let frame = fixed(ServerEvent::Plan {
            title: "Refactor".to_string(),
            tasks: vec![
                PlanTask {
                    content: "read".to_string(),
                    status: "completed".to_string(),
                },
                PlanTask {
                    content: "write".to_string(),
                    status: "pending".to_string(),
                },
            ],
        });
        let value = serde_json::to_value(frame).unwrap();
        assert_eq!(value["tasks"][0]["content"], "read");
        assert_eq!(value["tasks"][1]["content"], "write");
        assert_eq!(value["tasks"][1]["status"], "pending");
    }

    #[test]
    fn test_tool_response_echo_keeps_null_id() {
        let value = serde_json::to_value(fixed(ServerEvent::ToolResponseReceived {
            tool_id: None,
            approved: true,
        }))
        .unwrap();
        assert!(value["tool_id"].is_null());
        assert_eq!(value["approved"], true);
    }

    #[test]
    fn test_config_updated_echoes_record() {
        let value = serde_json::to_value(fixed(ServerEvent::ConfigUpdated {
            config: SessionConfig::default(),
        }))
        .unwrap();
        assert_eq!(
            value["config"],
            json!({"permission_mode": "auto", "auto_start_process": true, "session_id": null})
        );
    }
}
