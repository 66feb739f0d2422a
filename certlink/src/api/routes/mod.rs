//! API route modules.

pub mod health;
pub mod logging;
pub mod sync;
pub mod webhooks;

use axum::{Json, Router, extract::State, routing::get};
use serde_json::{Value, json};

use crate::api::server::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    let prefix = state
        .settings
        .server
        .api_prefix
        .trim_end_matches('/')
        .to_string();

    Router::new()
        .route("/", get(service_info))
        .nest(&format!("{prefix}/webhooks"), webhooks::router())
        .nest(&format!("{prefix}/sync"), sync::router())
        .nest(&format!("{prefix}/logging"), logging::router())
        .nest("/health", health::router())
        .with_state(state)
}

/// Service name, version and endpoint map.
async fn service_info(State(state): State<AppState>) -> Json<Value> {
    let prefix = state.settings.server.api_prefix.trim_end_matches('/');
    Json(json!({
        "message": state.settings.app_name,
        "version": state.settings.app_version,
        "endpoints": {
            "nowcerts_webhook": format!("{prefix}/webhooks/nowcerts"),
            "ghl_webhook": format!("{prefix}/webhooks/ghl"),
            "manual_sync": format!("{prefix}/sync/manual"),
            "logging": format!("{prefix}/logging"),
            "health": "/health",
        }
    }))
}
