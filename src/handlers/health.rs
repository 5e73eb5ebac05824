use axum::Json;
use tracing::debug;

use crate::models::HealthResponse;

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse::ok("Server is running"))
}

/// Readiness check endpoint
pub async fn ready_check() -> Json<HealthResponse> {
    debug!("Readiness check requested");
    // The editing core holds no startup dependencies of its own; a real
    // deployment would probe its document store here.
    Json(HealthResponse::ok("Service is ready"))
}
