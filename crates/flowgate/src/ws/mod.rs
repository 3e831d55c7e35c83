//! WebSocket gateway between browser clients and the assistant backend.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    Browser client                        │
//! │  - One WebSocket per client id (/ws/{client_id})         │
//! │  - Sends chat / config / tool_response / ping            │
//! └─────────────────────────────┬────────────────────────────┘
//!                               │ WebSocket
//! ┌─────────────────────────────▼────────────────────────────┐
//! │  handler: reader loop (one frame at a time) + writer     │
//! └───────────────┬──────────────────────────────▲───────────┘
//!                 │ text frames                  │ OutboundFrame
//! ┌───────────────▼────────────┐   send   ┌──────┴───────────┐
//! │          Relay             ├─────────▶│ SessionRegistry  │
//! │  dispatch + chat turns     │          │ id → queue/config│
//! └───────────────┬────────────┘          └──────────────────┘
//!                 │ open_session / next_event
//! ┌───────────────▼────────────┐
//! │   dyn AssistantBackend     │
//! └────────────────────────────┘
//! ```

mod handler;
mod registry;
mod relay;

pub use handler::ws_handler;
pub use registry::{Admission, ConnectionId, Delivery, FrameSender, SessionRegistry};
pub use relay::Relay;
