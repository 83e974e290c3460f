#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};

pub const TEST_TOKEN: &str = "test-token";
/// The user `TEST_TOKEN` authenticates as.
pub const TEST_USER_ID: &str = "u-alice";

struct FakeServer {
    /// channel_id -> records, newest first like the real server
    history: Mutex<HashMap<String, Vec<Value>>>,
}

type SharedServer = Arc<FakeServer>;

/// Start a fake REST + WebSocket server on a random TCP port and return
/// its base URL.
pub async fn start_server(history: HashMap<String, Vec<Value>>) -> String {
    let state = Arc::new(FakeServer {
        history: Mutex::new(history),
    });
    // One path segment serves both the channel listing and single-message
    // updates, keyed by method
    let app = Router::new()
        .route(
            "/api/messages/{id}",
            get(list_messages).put(edit_message).delete(delete_message),
        )
        .route("/api/ws/channels/{channel_id}", get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = format!("http://127.0.0.1:{}/api", addr.port());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    base
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|t| t == TEST_TOKEN)
}

fn detail(status: StatusCode, detail: &str) -> axum::response::Response {
    (status, Json(json!({ "detail": detail }))).into_response()
}

async fn list_messages(
    State(state): State<SharedServer>,
    Path(channel_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !authorized(&headers) {
        return detail(StatusCode::UNAUTHORIZED, "Not authenticated");
    }

    let history = state.history.lock().unwrap();
    let Some(records) = history.get(&channel_id) else {
        return detail(StatusCode::NOT_FOUND, "Channel not found");
    };

    let skip: usize = query.get("skip").and_then(|v| v.parse().ok()).unwrap_or(0);
    let limit: usize = query.get("limit").and_then(|v| v.parse().ok()).unwrap_or(50);
    let page: Vec<Value> = records
        .iter()
        .filter(|r| !r["is_deleted"].as_bool().unwrap_or(false))
        .skip(skip)
        .take(limit)
        .cloned()
        .collect();
    Json(Value::Array(page)).into_response()
}

/// Finds a stored record by id and checks the caller owns it.
fn with_owned_record<F>(state: &FakeServer, message_id: &str, f: F) -> axum::response::Response
where
    F: FnOnce(&mut Value) -> axum::response::Response,
{
    let mut history = state.history.lock().unwrap();
    let Some(record) = history
        .values_mut()
        .flat_map(|records| records.iter_mut())
        .find(|r| r["id"].to_string().trim_matches('"') == message_id)
    else {
        return detail(StatusCode::NOT_FOUND, "Message not found");
    };
    if record["user"]["id"] != TEST_USER_ID {
        return detail(StatusCode::FORBIDDEN, "Can only change your own messages");
    }
    f(record)
}

async fn edit_message(
    State(state): State<SharedServer>,
    Path(message_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if !authorized(&headers) {
        return detail(StatusCode::UNAUTHORIZED, "Not authenticated");
    }

    with_owned_record(&state, &message_id, |record| {
        if record["is_deleted"].as_bool().unwrap_or(false) {
            return detail(StatusCode::BAD_REQUEST, "Cannot edit a deleted message");
        }
        record["content"] = body["content"].clone();
        record["is_edited"] = json!(true);
        Json(record.clone()).into_response()
    })
}

async fn delete_message(
    State(state): State<SharedServer>,
    Path(message_id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !authorized(&headers) {
        return detail(StatusCode::UNAUTHORIZED, "Not authenticated");
    }

    with_owned_record(&state, &message_id, |record| {
        record["is_deleted"] = json!(true);
        record["content"] = json!("[Message deleted]");
        Json(json!({"message": "Message deleted successfully"})).into_response()
    })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let token = query.get("token").cloned().unwrap_or_default();
    ws.on_upgrade(move |socket| handle_socket(socket, token))
}

fn isoformat_now() -> String {
    chrono::Utc::now()
        .naive_utc()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

async fn handle_socket(mut socket: WebSocket, token: String) {
    if token != TEST_TOKEN {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: 4001,
                reason: "User not found".into(),
            })))
            .await;
        return;
    }

    let (mut tx, mut rx) = socket.split();
    let joined = json!({
        "type": "user_joined",
        "user": {"id": TEST_USER_ID, "username": "alice"},
        "timestamp": isoformat_now(),
    });
    if tx.send(Message::Text(joined.to_string().into())).await.is_err() {
        return;
    }

    while let Some(Ok(msg)) = rx.next().await {
        match msg {
            Message::Text(text) => {
                let Ok(data) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                // Same shapes the production server broadcasts; message
                // frames carry no id and no channel id
                let reply = match data["type"].as_str() {
                    Some("message") => json!({
                        "type": "message",
                        "data": {
                            "content": data["content"],
                            "sender": {"id": TEST_USER_ID, "username": "alice", "email": "alice@test.com"},
                            "timestamp": isoformat_now(),
                        }
                    }),
                    Some("typing") => json!({"type": "typing", "user_id": TEST_USER_ID, "username": "alice"}),
                    Some("stopped_typing") => json!({"type": "stopped_typing", "user_id": TEST_USER_ID}),
                    _ => continue,
                };
                if tx.send(Message::Text(reply.to_string().into())).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}
