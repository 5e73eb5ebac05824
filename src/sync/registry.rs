use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{OnlineUser, ServerEvent};

const ROOM_CHANNEL_CAPACITY: usize = 256;

/// A broadcast payload addressed to a room, with optional sender exclusion so
/// originators do not receive their own echo.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub exclude: Option<Uuid>,
    pub event: ServerEvent,
}

/// One registered connection inside a room.
#[derive(Debug, Clone)]
pub struct RoomMember {
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
    pub joined_at: DateTime<Utc>,
}

/// Outcome of removing a session from a room.
#[derive(Debug)]
pub struct LeaveOutcome {
    pub user_id: String,
    /// True when the user has no remaining session in the room: their cursor
    /// should be dropped and a departure notified.
    pub user_departed: bool,
    /// True when the room itself is gone: the document's apply worker can be
    /// retired.
    pub room_empty: bool,
}

struct Room {
    sessions: RwLock<HashMap<Uuid, RoomMember>>,
    tx: broadcast::Sender<Outbound>,
}

impl Room {
    fn new() -> Self {
        let (tx, _rx) = broadcast::channel(ROOM_CHANNEL_CAPACITY);
        Self {
            sessions: RwLock::new(HashMap::new()),
            tx,
        }
    }
}

/// Tracks which connection belongs to which document room. Owns membership
/// and the per-room broadcast channel; canonical content and cursors are
/// owned elsewhere.
pub struct SessionRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    async fn get_or_create_room(&self, document_id: &str) -> Arc<Room> {
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(document_id) {
                return room.clone();
            }
        }

        let mut rooms = self.rooms.write().await;
        // Double-check after acquiring the write lock
        if let Some(room) = rooms.get(document_id) {
            return room.clone();
        }
        let room = Arc::new(Room::new());
        rooms.insert(document_id.to_string(), room.clone());
        info!("created room for document {}", document_id);
        room
    }

    /// Register a session and subscribe it to the room's broadcast channel.
    /// Returns the deduplicated online-user list including the new member.
    pub async fn join(
        &self,
        document_id: &str,
        connection_id: Uuid,
        member: RoomMember,
    ) -> (Vec<OnlineUser>, broadcast::Receiver<Outbound>) {
        let room = self.get_or_create_room(document_id).await;
        let rx = room.tx.subscribe();
        let users = {
            let mut sessions = room.sessions.write().await;
            sessions.insert(connection_id, member);
            debug!(
                "connection {} joined document {} ({} sessions)",
                connection_id,
                document_id,
                sessions.len()
            );
            dedup_online(&sessions)
        };

        // A concurrent leave may have dropped the room between the lookup and
        // the insert above; re-register it so the membership stays reachable.
        {
            let mut rooms = self.rooms.write().await;
            let registered = rooms
                .get(document_id)
                .is_some_and(|current| Arc::ptr_eq(current, &room));
            if !registered {
                rooms.insert(document_id.to_string(), room.clone());
            }
        }

        (users, rx)
    }

    /// Remove a session. Returns `None` when the connection was not in the
    /// room. Empty rooms are removed here so idle documents hold no state.
    pub async fn leave(&self, document_id: &str, connection_id: Uuid) -> Option<LeaveOutcome> {
        let room = {
            let rooms = self.rooms.read().await;
            rooms.get(document_id)?.clone()
        };

        let (member, user_departed, room_empty) = {
            let mut sessions = room.sessions.write().await;
            let member = sessions.remove(&connection_id)?;
            let user_departed = !sessions.values().any(|m| m.user_id == member.user_id);
            (member, user_departed, sessions.is_empty())
        };

        if room_empty {
            let mut rooms = self.rooms.write().await;
            // Re-check: a concurrent join may have raced the removal.
            let still_empty = match rooms.get(document_id) {
                Some(room) => room.sessions.read().await.is_empty(),
                None => false,
            };
            if still_empty {
                rooms.remove(document_id);
                info!("removed empty room for document {}", document_id);
            }
        }

        Some(LeaveOutcome {
            user_id: member.user_id,
            user_departed,
            room_empty,
        })
    }

    /// Deduplicated online users for a room, ordered by user id.
    pub async fn online_users(&self, document_id: &str) -> Vec<OnlineUser> {
        let rooms = self.rooms.read().await;
        match rooms.get(document_id) {
            Some(room) => dedup_online(&*room.sessions.read().await),
            None => Vec::new(),
        }
    }

    /// Deliver an event to every subscribed session of a room. Best-effort,
    /// at-most-once: a send into a room with no receivers is a no-op.
    pub async fn publish(&self, document_id: &str, outbound: Outbound) {
        let rooms = self.rooms.read().await;
        if let Some(room) = rooms.get(document_id) {
            let _ = room.tx.send(outbound);
        }
    }

    /// (room count, session count) across all documents.
    pub async fn stats(&self) -> (usize, usize) {
        let rooms = self.rooms.read().await;
        let mut sessions = 0;
        for room in rooms.values() {
            sessions += room.sessions.read().await.len();
        }
        (rooms.len(), sessions)
    }
}

fn dedup_online(sessions: &HashMap<Uuid, RoomMember>) -> Vec<OnlineUser> {
    let mut by_user: BTreeMap<&str, OnlineUser> = BTreeMap::new();
    for member in sessions.values() {
        by_user
            .entry(member.user_id.as_str())
            .or_insert_with(|| OnlineUser {
                user_id: member.user_id.clone(),
                user_name: member.user_name.clone(),
                user_email: member.user_email.clone(),
            });
    }
    by_user.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(user_id: &str) -> RoomMember {
        RoomMember {
            user_id: user_id.to_string(),
            user_name: user_id.to_uppercase(),
            user_email: format!("{}@example.com", user_id),
            joined_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn two_connections_of_one_user_report_once() {
        let registry = SessionRegistry::new();
        let (users, _rx1) = registry.join("d1", Uuid::new_v4(), member("alice")).await;
        assert_eq!(users.len(), 1);
        let (users, _rx2) = registry.join("d1", Uuid::new_v4(), member("alice")).await;
        assert_eq!(users.len(), 1);
        let (users, _rx3) = registry.join("d1", Uuid::new_v4(), member("bob")).await;
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].user_id, "alice");
        assert_eq!(users[1].user_id, "bob");
    }

    #[tokio::test]
    async fn leave_reports_departure_only_for_last_session() {
        let registry = SessionRegistry::new();
        let conn1 = Uuid::new_v4();
        let conn2 = Uuid::new_v4();
        let (_, _rx1) = registry.join("d1", conn1, member("alice")).await;
        let (_, _rx2) = registry.join("d1", conn2, member("alice")).await;

        let outcome = registry.leave("d1", conn1).await.unwrap();
        assert!(!outcome.user_departed);
        assert!(!outcome.room_empty);

        let outcome = registry.leave("d1", conn2).await.unwrap();
        assert!(outcome.user_departed);
        assert!(outcome.room_empty);

        let (rooms, sessions) = registry.stats().await;
        assert_eq!((rooms, sessions), (0, 0));
    }

    #[tokio::test]
    async fn leave_of_unknown_connection_is_none() {
        let registry = SessionRegistry::new();
        assert!(registry.leave("d1", Uuid::new_v4()).await.is_none());
        let (_, _rx) = registry.join("d1", Uuid::new_v4(), member("alice")).await;
        assert!(registry.leave("d1", Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn publish_reaches_subscribed_sessions() {
        let registry = SessionRegistry::new();
        let conn = Uuid::new_v4();
        let (_, mut rx) = registry.join("d1", conn, member("alice")).await;
        registry
            .publish(
                "d1",
                Outbound {
                    exclude: Some(conn),
                    event: ServerEvent::UserLeft {
                        document_id: "d1".to_string(),
                        user_id: "bob".to_string(),
                    },
                },
            )
            .await;
        let outbound = rx.recv().await.unwrap();
        assert_eq!(outbound.exclude, Some(conn));
        assert!(matches!(outbound.event, ServerEvent::UserLeft { .. }));
    }
}
