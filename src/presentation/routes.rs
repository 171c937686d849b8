//! Route Configuration
//!
//! Configures the gateway endpoints and health probe.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;

use super::websocket::{devices_ws_handler, users_ws_handler};
use crate::startup::AppState;

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // WebSocket namespaces
        .route("/socket/users", get(users_ws_handler))
        .route("/socket/devices", get(devices_ws_handler))
        // Health check endpoint
        .route("/health", get(health_check))
        .with_state(state)
}

/// Health probe response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub environment: String,
    pub store: &'static str,
    pub expiry_bridge: bool,
    pub user_connections: usize,
    pub device_connections: usize,
}

/// Health check endpoint.
///
/// Issues one cheap store command to verify the shared store is reachable;
/// reports 503 when it is not, so orchestrators stop routing new clients
/// here.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_reachable = state.store.exists(&["health"]).await.is_ok();

    let body = HealthResponse {
        status: if store_reachable { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        environment: state.settings.environment.clone(),
        store: if store_reachable {
            "reachable"
        } else {
            "unreachable"
        },
        expiry_bridge: state.expiry.is_some(),
        user_connections: state.users.connection_count(),
        device_connections: state.devices.connection_count(),
    };

    let code = if store_reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}
