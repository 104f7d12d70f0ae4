use axum::{Json, extract::State, response::IntoResponse};
use std::sync::Arc;

use crate::state::AppState;

// health handler, reports whether the sink has a live connection
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "sink": state.sink.name(),
        "sinkReady": state.sink.is_ready(),
    }))
}
