//! Manual sync route.

use axum::{Json, Router, extract::State, routing::post};

use crate::api::error::ApiResult;
use crate::api::models::{SyncRequest, SyncResponse};
use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/manual", post(sync_manual))
}

async fn sync_manual(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> ApiResult<Json<SyncResponse>> {
    let response = state.dispatcher.sync_manual(request).await?;
    Ok(Json(response))
}
