//! Webhook receivers.

use axum::{Json, Router, extract::State, routing::post};
use serde_json::Value;

use crate::api::error::ApiResult;
use crate::api::models::WebhookResponse;
use crate::api::server::AppState;
use crate::dispatcher::SourceSystem;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/nowcerts", post(nowcerts_webhook))
        .route("/ghl", post(ghl_webhook))
}

/// Receive a NowCerts event (`INSURED_*`, `POLICY_*`, `QUOTE_*`).
async fn nowcerts_webhook(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<WebhookResponse>> {
    dispatch(&state, SourceSystem::NowCerts, payload).await
}

/// Receive a GoHighLevel contact or opportunity event.
async fn ghl_webhook(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<WebhookResponse>> {
    dispatch(&state, SourceSystem::Ghl, payload).await
}

async fn dispatch(
    state: &AppState,
    source: SourceSystem,
    payload: Value,
) -> ApiResult<Json<WebhookResponse>> {
    let outcome = state.dispatcher.handle(source, payload).await?;
    Ok(Json(outcome.into()))
}
