use std::sync::Arc;

use axum::{extract::State, response::Json};
use serde_json::{Value, json};

use crate::state::AppState;

/// Health check handler
/// Reports that the server is running and how many sessions are connected
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "OK",
        "active_sessions": state.active_sessions(),
    }))
}
