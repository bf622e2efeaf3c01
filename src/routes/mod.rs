use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

pub mod api;
pub mod ws;

/// Full application router: health check plus the voice WebSocket.
pub fn app(state: Arc<AppState>) -> Router {
    api::create_api_router()
        .merge(ws::create_ws_router())
        .with_state(state)
}
