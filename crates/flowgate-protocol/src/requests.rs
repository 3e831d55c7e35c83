//! Client -> server request frames.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::{ConfigOverride, SessionConfig};

/// Requests sent by the browser over its session socket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Start a chat turn.
    Chat {
        #[serde(default)]
        message: String,
        #[serde(default)]
        config: Option<ConfigOverride>,
    },

    /// Replace the session configuration.
    Config {
        #[serde(default)]
        config: SessionConfig,
    },

    /// User decision on a tool call. Acknowledged only.
    ToolResponse {
        #[serde(default)]
        tool_id: Option<String>,
        #[serde(default)]
        approved: bool,
    },

    /// Application-level liveness check.
    Ping {},
}

impl ClientRequest {
    /// Every `type` tag this enum accepts.
    pub const TAGS: [&'static str; 4] = ["chat", "config", "tool_response", "ping"];

    /// The wire tag of this request.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Chat { .. } => "chat",
            Self::Config { .. } => "config",
            Self::ToolResponse { .. } => "tool_response",
            Self::Ping {} => "ping",
        }
    }
}

/// Why an inbound frame could not be turned into a [`ClientRequest`].
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid frame: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("missing message type")]
    MissingType,

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("malformed {tag} frame: {source}")]
    Malformed {
        tag: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Parse one text frame.
///
/// The tag is checked before the payload so that an unrecognized tag is
/// reported as such rather than as a generic deserialization failure.
pub fn parse_request(text: &str) -> Result<ClientRequest, FrameError> {
    let value: Value = serde_json::from_str(text).map_err(FrameError::InvalidJson)?;

    let tag = match value.get("type") {
        Some(Value::String(tag)) => tag.clone(),
        Some(other) => other.to_string(),
        None => return Err(FrameError::MissingType),
    };

    if !ClientRequest::TAGS.contains(&tag.as_str()) {
        return Err(FrameError::UnknownType(tag));
    }

    serde_json::from_value(value).map_err(|source| FrameError::Malformed { tag, source })
}
