use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::Cursor;

/// Ephemeral per-document cursor state.
///
/// One live cursor per user per document, overwritten on each update
/// (last-write-wins on `last_updated`). Entries idle longer than `ttl` are
/// dropped by the periodic sweep, not per event. Typing indicators carry no
/// state and never pass through here.
pub struct PresenceTracker {
    cursors: RwLock<HashMap<String, HashMap<String, Cursor>>>,
    ttl: Duration,
}

impl PresenceTracker {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            cursors: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }

    /// Upsert a user's cursor. An update older than the stored one is
    /// discarded so concurrent updates for the same user resolve to the
    /// latest timestamp.
    pub async fn update_cursor(&self, document_id: &str, cursor: Cursor) {
        let mut cursors = self.cursors.write().await;
        let room = cursors.entry(document_id.to_string()).or_default();
        match room.get(&cursor.user_id) {
            Some(existing) if existing.last_updated > cursor.last_updated => {}
            _ => {
                room.insert(cursor.user_id.clone(), cursor);
            }
        }
    }

    /// Drop a user's cursor, e.g. when their last session leaves the room.
    pub async fn remove_user(&self, document_id: &str, user_id: &str) {
        let mut cursors = self.cursors.write().await;
        if let Some(room) = cursors.get_mut(document_id) {
            room.remove(user_id);
            if room.is_empty() {
                cursors.remove(document_id);
            }
        }
    }

    /// Remove cursors idle past the TTL. Returns how many were dropped.
    pub async fn prune_stale(&self, now: DateTime<Utc>) -> usize {
        let horizon = now - self.ttl;
        let mut cursors = self.cursors.write().await;
        let mut removed = 0;
        cursors.retain(|document_id, room| {
            let before = room.len();
            room.retain(|_, cursor| cursor.last_updated > horizon);
            removed += before - room.len();
            if room.is_empty() {
                debug!("pruned all cursors for document {}", document_id);
                false
            } else {
                true
            }
        });
        removed
    }

    pub async fn cursor_count(&self) -> usize {
        let cursors = self.cursors.read().await;
        cursors.values().map(|room| room.len()).sum()
    }

    #[cfg(test)]
    pub async fn cursor_of(&self, document_id: &str, user_id: &str) -> Option<Cursor> {
        let cursors = self.cursors.read().await;
        cursors
            .get(document_id)
            .and_then(|room| room.get(user_id))
            .cloned()
    }
}
