//! End-to-end tests: a real server on an ephemeral port, driven by real
//! WebSocket clients through the join / edit / presence / disconnect flows.

use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use scribesync::models::{CollaboratorRole, Document};
use scribesync::store::{DocumentStore, InMemoryDocumentStore};
use scribesync::{create_app, AppState, Config};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const SECRET: &str = "integration-secret";

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Serialize)]
struct Claims {
    #[serde(rename = "userId")]
    user_id: String,
    name: String,
    email: String,
    exp: i64,
}

fn mint_token(user_id: &str, name: &str) -> String {
    let claims = Claims {
        user_id: user_id.to_string(),
        name: name.to_string(),
        email: format!("{}@example.com", user_id),
        exp: chrono::Utc::now().timestamp() + 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

/// Boot a server against a seeded store; returns the ws endpoint and state.
async fn start_server() -> (String, Arc<AppState>) {
    let store = Arc::new(InMemoryDocumentStore::new());
    let doc = Document::new("d1", "Shared notes", "alice", "Alice", "alice@example.com")
        .with_collaborator("bob", "Bob", "bob@example.com", CollaboratorRole::Editor)
        .with_collaborator("carol", "Carol", "carol@example.com", CollaboratorRole::Viewer);
    store.insert(doc).await;

    let config = Config {
        jwt_secret: Some(SECRET.to_string()),
        ..Config::default()
    };
    let state = AppState::new(config, store);
    let app = create_app(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("ws://127.0.0.1:{}/api/v1/ws", port), state)
}

async fn connect(url: &str, user_id: &str, name: &str) -> WsClient {
    let token = mint_token(user_id, name);
    let (ws, _) = connect_async(format!("{}?token={}", url, token))
        .await
        .expect("connection should be accepted");
    ws
}

async fn send(ws: &mut WsClient, event: Value) {
    ws.send(Message::text(event.to_string())).await.unwrap();
}

async fn join(ws: &mut WsClient, document_id: &str) -> Value {
    send(ws, json!({"type": "join-document", "documentId": document_id})).await;
    next_event_of(ws, "joined").await
}

/// Next text frame as JSON, skipping control frames.
async fn next_event(ws: &mut WsClient) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for an event")
            .expect("stream ended")
            .expect("socket error");
        if msg.is_text() {
            return serde_json::from_str(msg.to_text().unwrap()).unwrap();
        }
    }
}

/// Skip unrelated events until one of the wanted type arrives.
async fn next_event_of(ws: &mut WsClient, event_type: &str) -> Value {
    for _ in 0..10 {
        let event = next_event(ws).await;
        if event["type"] == event_type {
            return event;
        }
    }
    panic!("no '{}' event arrived", event_type);
}

#[tokio::test]
async fn join_edit_and_broadcast_round() {
    let (url, state) = start_server().await;

    let mut alice = connect(&url, "alice", "Alice").await;
    let joined = join(&mut alice, "d1").await;
    assert_eq!(joined["success"], true);
    assert_eq!(joined["document"]["content"], "");
    assert_eq!(joined["document"]["version"], 0);

    let online = next_event_of(&mut alice, "users-online").await;
    assert_eq!(online["users"].as_array().unwrap().len(), 1);

    let mut bob = connect(&url, "bob", "Bob").await;
    let joined = join(&mut bob, "d1").await;
    assert_eq!(joined["document"]["title"], "Shared notes");
    let online = next_event_of(&mut bob, "users-online").await;
    assert_eq!(online["users"].as_array().unwrap().len(), 2);

    // Alice is told about Bob
    let user_joined = next_event_of(&mut alice, "user-joined").await;
    assert_eq!(user_joined["user"]["userId"], "bob");

    // Alice edits; Bob sees it, Alice gets no echo
    send(
        &mut alice,
        json!({
            "type": "text-operation",
            "documentId": "d1",
            "operation": {"type": "insert", "position": 0, "content": "hi"}
        }),
    )
    .await;
    let updated = next_event_of(&mut bob, "document-updated").await;
    assert_eq!(updated["operation"]["content"], "hi");
    assert_eq!(updated["userId"], "alice");
    assert_eq!(updated["version"], 1);

    // Bob appends; the next update Alice observes is Bob's, proving her own
    // operation was never echoed back to her.
    send(
        &mut bob,
        json!({
            "type": "text-operation",
            "documentId": "d1",
            "operation": {"type": "insert", "position": 2, "content": "!"}
        }),
    )
    .await;
    let updated = next_event_of(&mut alice, "document-updated").await;
    assert_eq!(updated["userId"], "bob");
    assert_eq!(updated["version"], 2);

    let stored = state.store.find_document("d1").await.unwrap().unwrap();
    assert_eq!(stored.content, "hi!");
    assert_eq!(stored.version, 2);
}

#[tokio::test]
async fn stale_positions_apply_in_arrival_order() {
    let (url, state) = start_server().await;

    let mut alice = connect(&url, "alice", "Alice").await;
    join(&mut alice, "d1").await;
    let mut bob = connect(&url, "bob", "Bob").await;
    join(&mut bob, "d1").await;

    send(
        &mut alice,
        json!({
            "type": "text-operation",
            "documentId": "d1",
            "operation": {"type": "insert", "position": 0, "content": "hi!"}
        }),
    )
    .await;
    // Wait until Bob has observed it so the next two ops land in a known order.
    next_event_of(&mut bob, "document-updated").await;

    send(
        &mut alice,
        json!({
            "type": "text-operation",
            "documentId": "d1",
            "operation": {"type": "insert", "position": 0, "content": "X"}
        }),
    )
    .await;
    next_event_of(&mut bob, "document-updated").await;

    // Bob still aims at position 0: applied literally against current content.
    send(
        &mut bob,
        json!({
            "type": "text-operation",
            "documentId": "d1",
            "operation": {"type": "insert", "position": 0, "content": "Y"}
        }),
    )
    .await;
    let updated = next_event_of(&mut alice, "document-updated").await;
    assert_eq!(updated["userId"], "bob");
    assert_eq!(updated["version"], 3);

    let stored = state.store.find_document("d1").await.unwrap().unwrap();
    assert_eq!(stored.content, "YXhi!");
    assert_eq!(stored.version, 3);
}

#[tokio::test]
async fn viewer_edits_are_denied_without_state_change() {
    let (url, state) = start_server().await;

    let mut carol = connect(&url, "carol", "Carol").await;
    join(&mut carol, "d1").await;

    send(
        &mut carol,
        json!({
            "type": "text-operation",
            "documentId": "d1",
            "operation": {"type": "delete", "position": 0, "length": 1}
        }),
    )
    .await;
    let denied = next_event_of(&mut carol, "permission-denied").await;
    assert_eq!(denied["documentId"], "d1");

    let stored = state.store.find_document("d1").await.unwrap().unwrap();
    assert_eq!(stored.content, "");
    assert_eq!(stored.version, 0);
}

#[tokio::test]
async fn operations_before_join_are_rejected() {
    let (url, _state) = start_server().await;

    let mut alice = connect(&url, "alice", "Alice").await;
    send(
        &mut alice,
        json!({
            "type": "text-operation",
            "documentId": "d1",
            "operation": {"type": "insert", "position": 0, "content": "hi"}
        }),
    )
    .await;
    let error = next_event_of(&mut alice, "error").await;
    assert!(error["message"].as_str().unwrap().contains("join"));
}

#[tokio::test]
async fn invalid_token_refuses_the_connection() {
    let (url, _state) = start_server().await;
    assert!(connect_async(format!("{}?token=garbage", url)).await.is_err());
    assert!(connect_async(url).await.is_err());
}

#[tokio::test]
async fn cursor_and_typing_relay_to_peers() {
    let (url, _state) = start_server().await;

    let mut alice = connect(&url, "alice", "Alice").await;
    join(&mut alice, "d1").await;
    let mut bob = connect(&url, "bob", "Bob").await;
    join(&mut bob, "d1").await;

    send(
        &mut alice,
        json!({"type": "cursor-update", "documentId": "d1", "position": 4, "color": "#ff8800"}),
    )
    .await;
    let moved = next_event_of(&mut bob, "cursor-moved").await;
    assert_eq!(moved["cursor"]["userId"], "alice");
    assert_eq!(moved["cursor"]["position"], 4);
    assert_eq!(moved["cursor"]["color"], "#ff8800");

    send(&mut alice, json!({"type": "user-typing", "documentId": "d1"})).await;
    let typing = next_event_of(&mut bob, "user-typing").await;
    assert_eq!(typing["userId"], "alice");
    assert_eq!(typing["userName"], "Alice");
}

#[tokio::test]
async fn disconnect_cleans_up_presence_and_notifies_once() {
    let (url, state) = start_server().await;

    let mut alice = connect(&url, "alice", "Alice").await;
    join(&mut alice, "d1").await;
    let mut bob = connect(&url, "bob", "Bob").await;
    join(&mut bob, "d1").await;
    next_event_of(&mut alice, "user-joined").await;

    send(
        &mut alice,
        json!({"type": "cursor-update", "documentId": "d1", "position": 2, "color": "#007bff"}),
    )
    .await;
    next_event_of(&mut bob, "cursor-moved").await;
    assert_eq!(state.presence.cursor_count().await, 1);

    alice.close(None).await.unwrap();

    let left = next_event_of(&mut bob, "user-left").await;
    assert_eq!(left["userId"], "alice");

    // Cursor state follows the departure.
    for _ in 0..20 {
        if state.presence.cursor_count().await == 0 {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(state.presence.cursor_count().await, 0);

    let users = state.registry.online_users("d1").await;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].user_id, "bob");
}

#[tokio::test]
async fn second_tab_does_not_duplicate_presence() {
    let (url, state) = start_server().await;

    let mut tab1 = connect(&url, "alice", "Alice").await;
    join(&mut tab1, "d1").await;
    let mut tab2 = connect(&url, "alice", "Alice").await;
    let online = {
        join(&mut tab2, "d1").await;
        next_event_of(&mut tab2, "users-online").await
    };
    assert_eq!(online["users"].as_array().unwrap().len(), 1);

    // Closing one tab is not a departure: the user still has a session.
    tab2.close(None).await.unwrap();
    for _ in 0..20 {
        let (_, sessions) = state.registry.stats().await;
        if sessions == 1 {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }
    let users = state.registry.online_users("d1").await;
    assert_eq!(users.len(), 1);
}
