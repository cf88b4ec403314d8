use axum::{Json, extract::State};
use chrono::Utc;
use serde_json::{Value, json};

use crate::web::AppState;

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let table = state.schedule.table().await;
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
        "events": state.schedule.event_count().await,
        "scheduled": table.event_count(),
        "sessions": state.sessions.status(Utc::now()).await.len(),
    }))
}
