use axum::{routing::get, Router};
use std::sync::Arc;

use crate::handlers::{diagnostics, health_check, ready_check};
use crate::state::AppState;
use crate::ws::ws_handler;

/// Create API routes
pub fn create_api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health_check))
        .route("/v1/ready", get(ready_check))
        .route("/v1/diagnostics", get(diagnostics))
        .route("/v1/ws", get(ws_handler))
        .with_state(state)
}
