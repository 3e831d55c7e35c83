//! Wire protocol between browser clients and the flowgate relay.
//!
//! Every frame is a JSON object tagged by `type`:
//!
//! ```text
//! client ── chat / config / tool_response / ping ──────────────▶ gateway
//! client ◀── connection / message_received / assistant_chunk ── gateway
//!            tool_call / plan / task_finish / config_updated
//!            tool_response_received / error / pong
//! ```

pub mod config;
pub mod events;
pub mod requests;

pub use config::{ConfigOverride, PermissionMode, SessionConfig};
pub use events::{OutboundFrame, PlanTask, ServerEvent};
pub use requests::{ClientRequest, FrameError, parse_request};
