//! HTTP request handlers.

use axum::{Json, extract::State};
use serde::Serialize;

use super::state::AppState;

pub const SERVICE_NAME: &str = "flowgate";

/// Service descriptor.
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub backend_available: bool,
}

/// Liveness probe response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend_installed: bool,
    pub active_connections: usize,
}

/// GET /
pub async fn root(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
        backend_available: state.backend_available(),
    })
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        backend_installed: state.backend_available(),
        active_connections: state.registry.len(),
    })
}
