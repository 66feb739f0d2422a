//! Health check routes.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{ComponentHealth, HealthResponse};
use crate::api::server::AppState;
use crate::credentials::CredentialState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
}

fn components(state: &AppState) -> Vec<ComponentHealth> {
    let settings = &state.settings;
    let credential_state = state.dispatcher.nowcerts().credentials().state();
    let tracked = state.dispatcher.dedup().len();

    let nowcerts_configured =
        settings.nowcerts.username.is_some() && settings.nowcerts.password.is_some();
    let ghl_configured = settings.ghl.api_key.is_some();

    vec![
        ComponentHealth {
            name: "nowcerts".to_string(),
            status: if nowcerts_configured { "configured" } else { "unconfigured" }.to_string(),
            message: Some(format!("credential {}", credential_state)),
        },
        ComponentHealth {
            name: "ghl".to_string(),
            status: if ghl_configured { "configured" } else { "unconfigured" }.to_string(),
            message: settings
                .ghl
                .location_id
                .is_none()
                .then(|| "GHL_LOCATION_ID not set".to_string()),
        },
        ComponentHealth {
            name: "dedup".to_string(),
            status: "healthy".to_string(),
            message: Some(format!("{tracked} fingerprints tracked")),
        },
    ]
}

async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.settings.app_name.clone(),
        version: state.settings.app_version.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        components: components(&state),
    }))
}

/// Ready once both upstreams are configured.
async fn readiness_check(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let not_ready: Vec<String> = components(&state)
        .into_iter()
        .filter(|c| c.status == "unconfigured")
        .map(|c| c.name)
        .collect();

    if !not_ready.is_empty() {
        return Err(ApiError::service_unavailable(format!(
            "not ready: {} not configured",
            not_ready.join(", ")
        )));
    }

    let credential = state.dispatcher.nowcerts().credentials().state();
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ready",
            "credential": credential.as_str(),
            "credential_cached": credential != CredentialState::Empty,
        })),
    ))
}

async fn liveness_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "alive",
            "uptime_secs": uptime
        })),
    )
}
