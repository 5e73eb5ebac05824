use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Cursor, Document, OnlineUser, TextOperation};

/// Events a client may send over the WebSocket. One JSON object per text
/// frame, discriminated by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "join-document")]
    JoinDocument {
        #[serde(rename = "documentId")]
        document_id: String,
    },
    #[serde(rename = "leave-document")]
    LeaveDocument {
        #[serde(rename = "documentId")]
        document_id: String,
    },
    #[serde(rename = "text-operation")]
    TextOperation {
        #[serde(rename = "documentId")]
        document_id: String,
        operation: TextOperation,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename = "cursor-update")]
    CursorUpdate {
        #[serde(rename = "documentId")]
        document_id: String,
        position: usize,
        color: String,
    },
    #[serde(rename = "user-typing")]
    UserTyping {
        #[serde(rename = "documentId")]
        document_id: String,
    },
    #[serde(rename = "user-stopped-typing")]
    UserStoppedTyping {
        #[serde(rename = "documentId")]
        document_id: String,
    },
}

/// Events the server sends. Every event names its document so a single
/// connection can participate in several rooms at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Join acknowledgement to the joining connection only.
    #[serde(rename = "joined")]
    Joined {
        #[serde(rename = "documentId")]
        document_id: String,
        success: bool,
        document: Document,
    },
    /// Current deduplicated room membership, sent to the joining connection.
    #[serde(rename = "users-online")]
    UsersOnline {
        #[serde(rename = "documentId")]
        document_id: String,
        users: Vec<OnlineUser>,
    },
    #[serde(rename = "user-joined")]
    UserJoined {
        #[serde(rename = "documentId")]
        document_id: String,
        user: OnlineUser,
    },
    #[serde(rename = "user-left")]
    UserLeft {
        #[serde(rename = "documentId")]
        document_id: String,
        #[serde(rename = "userId")]
        user_id: String,
    },
    /// An applied operation, relayed to every room member except the sender.
    #[serde(rename = "document-updated")]
    DocumentUpdated {
        #[serde(rename = "documentId")]
        document_id: String,
        operation: TextOperation,
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "userName")]
        user_name: String,
        /// Server-assigned sequence number; equals the document version
        /// resulting from this operation.
        version: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename = "cursor-moved")]
    CursorMoved {
        #[serde(rename = "documentId")]
        document_id: String,
        cursor: Cursor,
    },
    #[serde(rename = "user-typing")]
    UserTyping {
        #[serde(rename = "documentId")]
        document_id: String,
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "userName")]
        user_name: String,
    },
    #[serde(rename = "user-stopped-typing")]
    UserStoppedTyping {
        #[serde(rename = "documentId")]
        document_id: String,
        #[serde(rename = "userId")]
        user_id: String,
    },
    #[serde(rename = "permission-denied")]
    PermissionDenied {
        #[serde(rename = "documentId")]
        document_id: String,
        message: String,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(rename = "documentId", skip_serializing_if = "Option::is_none")]
        document_id: Option<String>,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_parse_from_wire_names() {
        let ev: ClientEvent =
            serde_json::from_str(r#"{"type":"join-document","documentId":"d1"}"#).unwrap();
        assert!(matches!(ev, ClientEvent::JoinDocument { document_id } if document_id == "d1"));

        let ev: ClientEvent = serde_json::from_str(
            r#"{"type":"text-operation","documentId":"d1","operation":{"type":"insert","position":0,"content":"hi"}}"#,
        )
        .unwrap();
        match ev {
            ClientEvent::TextOperation {
                document_id,
                operation,
                timestamp,
            } => {
                assert_eq!(document_id, "d1");
                assert_eq!(operation.position(), 0);
                assert!(timestamp.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn unknown_event_types_fail_to_parse() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"shout","documentId":"d1"}"#).is_err());
    }

    #[test]
    fn server_events_carry_wire_names() {
        let ev = ServerEvent::UserLeft {
            document_id: "d1".to_string(),
            user_id: "u1".to_string(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "user-left");
        assert_eq!(json["documentId"], "d1");
        assert_eq!(json["userId"], "u1");
    }
}
