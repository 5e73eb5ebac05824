use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Capability role of a collaborator on a document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CollaboratorRole {
    Owner,
    Editor,
    Viewer,
}

impl fmt::Display for CollaboratorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollaboratorRole::Owner => write!(f, "owner"),
            CollaboratorRole::Editor => write!(f, "editor"),
            CollaboratorRole::Viewer => write!(f, "viewer"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
    pub role: CollaboratorRole,
    pub joined_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// Canonical document state.
///
/// `version` counts successfully applied text operations: it starts at 0 and
/// increases by exactly 1 per apply. `content` is addressed by character
/// offsets, never bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub owner_id: String,
    pub collaborators: Vec<Collaborator>,
    pub is_public: bool,
    pub version: u64,
    pub last_modified: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Create a fresh document owned by `owner_id`. The owner is also entered
    /// into the collaborator list with the `owner` role, matching the
    /// invariant that exactly one collaborator holds that role.
    pub fn new(id: &str, title: &str, owner_id: &str, owner_name: &str, owner_email: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            title: title.to_string(),
            content: String::new(),
            owner_id: owner_id.to_string(),
            collaborators: vec![Collaborator {
                user_id: owner_id.to_string(),
                user_name: owner_name.to_string(),
                user_email: owner_email.to_string(),
                role: CollaboratorRole::Owner,
                joined_at: now,
                last_active: now,
            }],
            is_public: false,
            version: 0,
            last_modified: now,
            created_at: now,
        }
    }

    /// Look up the role of a user on this document, if any.
    pub fn role_of(&self, user_id: &str) -> Option<CollaboratorRole> {
        self.collaborators
            .iter()
            .find(|c| c.user_id == user_id)
            .map(|c| c.role)
    }

    /// Add a collaborator if not already present. Collaborator management is
    /// an external concern; this helper exists for composition and tests.
    pub fn with_collaborator(
        mut self,
        user_id: &str,
        user_name: &str,
        user_email: &str,
        role: CollaboratorRole,
    ) -> Self {
        if self.collaborators.iter().all(|c| c.user_id != user_id) {
            let now = Utc::now();
            self.collaborators.push(Collaborator {
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                user_email: user_email.to_string(),
                role,
                joined_at: now,
                last_active: now,
            });
        }
        self
    }

    pub fn with_public(mut self, is_public: bool) -> Self {
        self.is_public = is_public;
        self
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.content = content.to_string();
        self
    }
}
