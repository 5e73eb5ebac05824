use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user visible in a document room, deduplicated across connections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
}

/// Live cursor of one user in one document. Ephemeral: overwritten on every
/// update, pruned after the configured idle horizon, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub user_id: String,
    pub user_name: String,
    pub position: usize,
    pub color: String,
    pub last_updated: DateTime<Utc>,
}
