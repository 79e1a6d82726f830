//! Health and introspection handlers

use std::sync::Arc;

use axum::{extract::State, response::Json};
use serde_json::{json, Value};

use crate::proxy::{ProxyHandler, UpstreamInfo};

/// Shared state for the gateway's own routes.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<UpstreamInfo>,
    pub oauth_enabled: bool,
    pub base_url: String,
}

/// Liveness probe. Served at an exact path registered before any mount,
/// so it keeps working regardless of what is mounted below it.
pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// Operational snapshot of the composed application.
pub async fn debug_info(State(state): State<AppState>) -> Json<Value> {
    let mut routes = vec!["/health", "/debug/info", "/mcp"];
    if state.oauth_enabled {
        routes.push("/oauth");
    }

    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "base_url": state.base_url,
        "upstream": {
            "name": state.upstream.name,
            "version": state.upstream.version,
            "source": state.upstream.source.display().to_string(),
            "command": state.upstream.command,
        },
        "handler": std::any::type_name::<ProxyHandler>(),
        "oauth_enabled": state.oauth_enabled,
        "routes": routes,
    }))
}
