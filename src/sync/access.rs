use crate::models::{CollaboratorRole, Document};

// Pure capability predicates, evaluated fresh against the latest document
// snapshot on every event. Results are never cached across checks.

pub fn can_view(document: &Document, user_id: &str) -> bool {
    if document.is_public {
        return true;
    }
    if document.owner_id == user_id {
        return true;
    }
    document.role_of(user_id).is_some()
}

pub fn can_edit(document: &Document, user_id: &str) -> bool {
    if document.owner_id == user_id {
        return true;
    }
    matches!(
        document.role_of(user_id),
        Some(CollaboratorRole::Owner) | Some(CollaboratorRole::Editor)
    )
}
