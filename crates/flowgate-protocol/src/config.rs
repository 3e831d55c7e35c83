//! Per-session configuration record.
//!
//! The record is stored as sent by the client and echoed back verbatim in
//! `config_updated`. Interpretation (e.g. the permission mode) happens only
//! when backend options are built for a chat turn.

use serde::{Deserialize, Serialize};

/// Configuration a client attaches to its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// "auto", "confirm" or "deny". Unrecognized values behave like "auto".
    #[serde(default = "default_permission_mode")]
    pub permission_mode: String,

    /// Whether the backend may start its agent process on demand.
    #[serde(default = "default_true")]
    pub auto_start_process: bool,

    /// Backend session to resume, if any.
    #[serde(default)]
    pub session_id: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            permission_mode: default_permission_mode(),
            auto_start_process: true,
            session_id: None,
        }
    }
}

impl SessionConfig {
    /// Resolve the stored permission mode string.
    pub fn permission_mode(&self) -> PermissionMode {
        PermissionMode::from_config(&self.permission_mode)
    }

    /// Apply a per-turn override on top of this record.
    ///
    /// Fields absent from the override keep their stored value.
    pub fn with_override(&self, overrides: &ConfigOverride) -> Self {
        Self {
            permission_mode: overrides
                .permission_mode
                .clone()
                .unwrap_or_else(|| self.permission_mode.clone()),
            auto_start_process: overrides
                .auto_start_process
                .unwrap_or(self.auto_start_process),
            session_id: overrides
                .session_id
                .clone()
                .or_else(|| self.session_id.clone()),
        }
    }
}

/// Partial configuration carried by a `chat` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_start_process: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// How the backend treats tool calls that need user consent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionMode {
    /// Run tools without asking.
    #[default]
    Auto,
    /// Ask the user before running a tool.
    Confirm,
    /// Refuse every tool call.
    Deny,
}

impl PermissionMode {
    /// Map a config string to a mode, falling back to `Auto`.
    pub fn from_config(value: &str) -> Self {
        match value {
            "confirm" => Self::Confirm,
            "deny" => Self::Deny,
            _ => Self::Auto,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Confirm => "confirm",
            Self::Deny => "deny",
        }
    }
}

impl std::fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_permission_mode() -> String {
    "auto".to_string()
}

fn default_true() -> bool {
    true
}
