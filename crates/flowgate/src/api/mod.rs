//! HTTP API module.
//!
//! Serves the service descriptor, the liveness probe and the WebSocket
//! endpoint.

mod handlers;
mod routes;
mod state;

pub use handlers::{HealthResponse, SERVICE_NAME, ServiceInfo};
pub use routes::create_router;
pub use state::AppState;
