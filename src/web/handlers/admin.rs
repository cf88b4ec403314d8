//! Administrative JSON API under `/api/v1`.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::web::AppState;
use crate::web::responses::ApiResponse;

#[derive(Debug, Serialize)]
struct ProviderRemoval {
    provider: String,
    unregistered: bool,
    rebuild: crate::schedule::RebuildReport,
}

/// GET /api/v1/channels/status
pub async fn channel_status(State(state): State<AppState>) -> Response {
    ApiResponse::success(state.sessions.status(Utc::now()).await).into_response()
}

/// POST /api/v1/schedule/rebuild
pub async fn rebuild_schedule(State(state): State<AppState>) -> Response {
    info!("Manual schedule refresh requested");
    ApiResponse::success(state.schedule.refresh_schedule().await).into_response()
}

/// POST /api/v1/schedule/reset
pub async fn reset_schedule(State(state): State<AppState>) -> Response {
    state.schedule.reset_all().await;
    let sessions = state.sessions.reset_all().await;
    ApiResponse::success(json!({ "sessions_discarded": sessions })).into_response()
}

/// DELETE /api/v1/providers/{name}
pub async fn remove_provider(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let unregistered = state.schedule.providers().unregister(&name).await;
    let rebuild = state.schedule.remove_provider(&name).await;
    ApiResponse::success(ProviderRemoval {
        provider: name,
        unregistered,
        rebuild,
    })
    .into_response()
}

/// POST /api/v1/channels/{id}/reset
pub async fn reset_channel(State(state): State<AppState>, Path(channel): Path<u32>) -> Response {
    if state.sessions.reset(channel).await {
        ApiResponse::success(json!({ "channel": channel, "reset": true })).into_response()
    } else {
        ApiResponse::error(format!("channel {channel} has no session")).into_response()
    }
}
