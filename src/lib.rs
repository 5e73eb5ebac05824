//! scribesync
//!
//! Real-time collaborative text editing service. Clients connect over a
//! WebSocket, join per-document rooms, and exchange position-addressed
//! insert/delete operations. The server is authoritative: every operation is
//! serialized per document, applied against canonical content, persisted, and
//! relayed to the other room members along with cursor and presence traffic.

pub mod auth;
pub mod config;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
pub mod sync;
pub mod ws;

pub use config::Config;
pub use state::AppState;

use axum::http::HeaderValue;
use axum::Router;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::debug;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Assemble the full application router. Shared between the binary and the
/// integration tests.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = match &state.config.cors_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_methods(Any)
                .allow_headers(Any)
                .allow_origin(AllowOrigin::list(origins))
        }
        None => CorsLayer::new()
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_origin(Any),
    };

    Router::new()
        // Mount API routes
        .nest("/api", routes::create_api_routes(state))
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", docs::ApiDoc::openapi()))
        // Add tracing and CORS layers
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Start the periodic cursor prune sweep (spec'd to run on a cadence, not
/// per event).
pub fn spawn_presence_sweeper(state: Arc<AppState>) {
    let presence = state.presence.clone();
    let cadence = Duration::from_secs(state.config.presence_sweep_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cadence);
        loop {
            interval.tick().await;
            let removed = presence.prune_stale(Utc::now()).await;
            if removed > 0 {
                debug!("presence sweep pruned {} stale cursors", removed);
            }
        }
    });
}
