use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{self, AuthUser};
use crate::models::{ClientEvent, Cursor, ErrorResponse, OnlineUser, ServerEvent, TextOperation};
use crate::state::AppState;
use crate::store::DocumentStore;
use crate::sync::access;
use crate::sync::registry::{Outbound, RoomMember};
use crate::sync::SyncError;

/// Query parameters for the WebSocket upgrade
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler. Authentication happens before the upgrade:
/// a missing or invalid token refuses the connection and no session is
/// ever created for it.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(verifier) = &state.verifier else {
        warn!("rejecting WebSocket connection: no JWT secret configured");
        return unauthorized("authentication is not configured");
    };

    let token = match auth::extract_token(&headers, query.token.as_deref()) {
        Ok(token) => token,
        Err(e) => {
            info!("rejecting WebSocket connection: {}", e);
            return unauthorized("authentication token required");
        }
    };

    let user = match verifier.verify(&token) {
        Ok(user) => user,
        Err(e) => {
            info!("rejecting WebSocket connection: {}", e);
            return unauthorized("invalid authentication token");
        }
    };

    info!("WebSocket upgrade for user {} ({})", user.user_name, user.user_id);
    ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

fn unauthorized(message: &str) -> Response {
    let status = StatusCode::UNAUTHORIZED;
    (status, Json(ErrorResponse::new(status, message))).into_response()
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user: AuthUser) {
    let conn_id = Uuid::new_v4();
    info!(
        "connection {} established for user {}",
        conn_id, user.user_id
    );

    let (mut sender, mut receiver) = socket.split();

    // All outbound traffic (direct replies and forwarded room broadcasts)
    // funnels through one channel so the sink has a single writer.
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let mut connection = Connection {
        conn_id,
        user,
        state: state.clone(),
        outbound: outbound_tx,
        rooms: HashMap::new(),
    };

    let mut heartbeat = tokio::time::interval(Duration::from_secs(
        state.config.heartbeat_interval_secs,
    ));
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let deadline = Duration::from_secs(state.config.heartbeat_deadline_secs());
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    last_seen = Instant::now();
                    match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => connection.handle_event(event).await,
                        Err(e) => {
                            debug!("connection {} sent an unparseable event: {}", conn_id, e);
                            connection.send(ServerEvent::Error {
                                document_id: None,
                                message: format!("unrecognized event: {}", e),
                            });
                        }
                    }
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    last_seen = Instant::now();
                }
                Some(Ok(Message::Close(_))) | None => break,
                // Binary frames are not part of the protocol
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("connection {} socket error: {}", conn_id, e);
                    break;
                }
            },
            outbound = outbound_rx.recv() => match outbound {
                Some(event) => {
                    let Ok(text) = serde_json::to_string(&event) else { continue };
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            _ = heartbeat.tick() => {
                if last_seen.elapsed() > deadline {
                    info!("connection {} missed heartbeats, closing", conn_id);
                    break;
                }
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    connection.cleanup().await;
    info!("connection {} closed", conn_id);
}

/// Per-(connection, document) lifecycle. Absent from the map means Unjoined
/// (or Left); only `Joined` accepts operation/cursor/typing events.
enum RoomPhase {
    Joining,
    Joined { forwarder: JoinHandle<()> },
}

struct Connection {
    conn_id: Uuid,
    user: AuthUser,
    state: Arc<AppState>,
    outbound: mpsc::UnboundedSender<ServerEvent>,
    rooms: HashMap<String, RoomPhase>,
}

impl Connection {
    fn send(&self, event: ServerEvent) {
        // The writer half going away just means the connection is closing.
        let _ = self.outbound.send(event);
    }

    fn send_error(&self, document_id: Option<String>, message: impl Into<String>) {
        self.send(ServerEvent::Error {
            document_id,
            message: message.into(),
        });
    }

    fn is_joined(&self, document_id: &str) -> bool {
        matches!(self.rooms.get(document_id), Some(RoomPhase::Joined { .. }))
    }

    async fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::JoinDocument { document_id } => self.join_document(document_id).await,
            ClientEvent::LeaveDocument { document_id } => {
                if !self.detach(&document_id).await {
                    self.send_error(Some(document_id), "not joined to this document");
                }
            }
            ClientEvent::TextOperation {
                document_id,
                operation,
                timestamp,
            } => self.text_operation(document_id, operation, timestamp).await,
            ClientEvent::CursorUpdate {
                document_id,
                position,
                color,
            } => self.cursor_update(document_id, position, color).await,
            ClientEvent::UserTyping { document_id } => {
                self.typing_indicator(document_id, true).await
            }
            ClientEvent::UserStoppedTyping { document_id } => {
                self.typing_indicator(document_id, false).await
            }
        }
    }

    async fn join_document(&mut self, document_id: String) {
        if self.rooms.contains_key(&document_id) {
            self.send_error(Some(document_id), "already joined to this document");
            return;
        }
        self.rooms.insert(document_id.clone(), RoomPhase::Joining);

        // Latest snapshot from the persistence collaborator at join time
        let document = match self.state.store.find_document(&document_id).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                self.rooms.remove(&document_id);
                self.send_error(
                    Some(document_id.clone()),
                    format!("document '{}' not found", document_id),
                );
                return;
            }
            Err(e) => {
                self.rooms.remove(&document_id);
                warn!("store failure while joining {}: {}", document_id, e);
                self.send_error(Some(document_id), "failed to load document");
                return;
            }
        };

        if !access::can_view(&document, &self.user.user_id) {
            self.rooms.remove(&document_id);
            self.send(ServerEvent::PermissionDenied {
                document_id,
                message: "you do not have permission to view this document".to_string(),
            });
            return;
        }

        let member = RoomMember {
            user_id: self.user.user_id.clone(),
            user_name: self.user.user_name.clone(),
            user_email: self.user.user_email.clone(),
            joined_at: Utc::now(),
        };
        let (online_users, rx) = self
            .state
            .registry
            .join(&document_id, self.conn_id, member)
            .await;
        let forwarder = spawn_forwarder(rx, self.conn_id, self.outbound.clone());
        self.rooms
            .insert(document_id.clone(), RoomPhase::Joined { forwarder });

        self.state
            .broadcaster
            .relay(
                &document_id,
                Some(self.conn_id),
                ServerEvent::UserJoined {
                    document_id: document_id.clone(),
                    user: OnlineUser {
                        user_id: self.user.user_id.clone(),
                        user_name: self.user.user_name.clone(),
                        user_email: self.user.user_email.clone(),
                    },
                },
            )
            .await;

        self.send(ServerEvent::Joined {
            document_id: document_id.clone(),
            success: true,
            document,
        });
        self.send(ServerEvent::UsersOnline {
            document_id,
            users: online_users,
        });
    }

    async fn text_operation(
        &mut self,
        document_id: String,
        operation: TextOperation,
        timestamp: Option<chrono::DateTime<Utc>>,
    ) {
        if !self.is_joined(&document_id) {
            self.send_error(
                Some(document_id),
                "join the document before sending operations",
            );
            return;
        }

        let result = self
            .state
            .synchronizer
            .apply_operation(
                &document_id,
                &self.user.user_id,
                &self.user.user_name,
                self.conn_id,
                operation,
                timestamp,
            )
            .await;

        match result {
            // The room broadcast already happened inside the apply worker;
            // the sender gets no echo of its own operation.
            Ok(applied) => debug!(
                "connection {} advanced document {} to version {}",
                self.conn_id, document_id, applied.version
            ),
            Err(SyncError::Permission(message)) => self.send(ServerEvent::PermissionDenied {
                document_id,
                message,
            }),
            Err(e @ SyncError::NotFound(_)) => {
                // The document disappeared under the session: report and
                // tear the session down.
                self.send_error(Some(document_id.clone()), e.to_string());
                self.detach(&document_id).await;
            }
            Err(e) => self.send_error(Some(document_id), e.to_string()),
        }
    }

    async fn cursor_update(&mut self, document_id: String, position: usize, color: String) {
        if !self.is_joined(&document_id) {
            self.send_error(
                Some(document_id),
                "join the document before sending cursor updates",
            );
            return;
        }
        let cursor = Cursor {
            user_id: self.user.user_id.clone(),
            user_name: self.user.user_name.clone(),
            position,
            color,
            last_updated: Utc::now(),
        };
        self.state.presence.update_cursor(&document_id, cursor.clone()).await;
        self.state
            .broadcaster
            .relay(
                &document_id,
                Some(self.conn_id),
                ServerEvent::CursorMoved {
                    document_id: document_id.clone(),
                    cursor,
                },
            )
            .await;
    }

    /// Typing signals are pass-through: relayed, never stored.
    async fn typing_indicator(&mut self, document_id: String, typing: bool) {
        if !self.is_joined(&document_id) {
            self.send_error(Some(document_id), "join the document first");
            return;
        }
        let event = if typing {
            ServerEvent::UserTyping {
                document_id: document_id.clone(),
                user_id: self.user.user_id.clone(),
                user_name: self.user.user_name.clone(),
            }
        } else {
            ServerEvent::UserStoppedTyping {
                document_id: document_id.clone(),
                user_id: self.user.user_id.clone(),
            }
        };
        self.state
            .broadcaster
            .relay(&document_id, Some(self.conn_id), event)
            .await;
    }

    /// Remove this connection from a room and run the departure side
    /// effects. Returns false when the connection was not joined.
    async fn detach(&mut self, document_id: &str) -> bool {
        let Some(phase) = self.rooms.remove(document_id) else {
            return false;
        };
        if let RoomPhase::Joined { forwarder } = phase {
            forwarder.abort();
        }

        if let Some(outcome) = self.state.registry.leave(document_id, self.conn_id).await {
            if outcome.user_departed {
                self.state
                    .presence
                    .remove_user(document_id, &outcome.user_id)
                    .await;
                self.state
                    .broadcaster
                    .relay(
                        document_id,
                        Some(self.conn_id),
                        ServerEvent::UserLeft {
                            document_id: document_id.to_string(),
                            user_id: outcome.user_id,
                        },
                    )
                    .await;
            }
            if outcome.room_empty {
                self.state.synchronizer.retire(document_id).await;
            }
        }
        true
    }

    /// Disconnect cleanup: leave every room this connection had joined.
    async fn cleanup(&mut self) {
        let documents: Vec<String> = self.rooms.keys().cloned().collect();
        for document_id in documents {
            self.detach(&document_id).await;
        }
    }
}

/// Forward room broadcasts to this connection, dropping its own echoes.
fn spawn_forwarder(
    mut rx: broadcast::Receiver<Outbound>,
    conn_id: Uuid,
    outbound: mpsc::UnboundedSender<ServerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(out) => {
                    if out.exclude == Some(conn_id) {
                        continue;
                    }
                    if outbound.send(out.event).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "connection {} lagged behind room broadcast, skipped {} events",
                        conn_id, skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
