use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API response for the health and readiness checks
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

impl HealthResponse {
    pub fn ok(message: &str) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.to_string(),
        }
    }
}
