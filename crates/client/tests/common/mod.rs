#![allow(dead_code)]

pub mod ws_helpers;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use huddle_client::history::{parse_records, HistoryFetcher, HistoryPage};
use huddle_client::live::{LiveConnection, LiveFeed};
use huddle_client::models::MessageRecord;
use huddle_client::{
    ChannelTranscriptClient, ClientError, ClientResult, TranscriptEvent, TranscriptHandle,
    TranscriptOptions,
};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};

/// A history record as the server returns it.
pub fn record(id: &str, content: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "content": content,
        "created_at": created_at,
        "sender": {"username": "alice"}
    })
}

/// A live `message` frame.
pub fn message_frame(id: &str, content: &str, created_at: &str) -> Value {
    json!({
        "type": "message",
        "id": id,
        "content": content,
        "created_at": created_at,
        "sender": {"username": "bob"}
    })
}

// ── History ──

/// History source that serves scripted pages, optionally held back until
/// the test releases them.
#[derive(Default)]
pub struct ScriptedHistory {
    pages: Mutex<VecDeque<Result<Vec<Value>, String>>>,
    gate: Option<Arc<Notify>>,
    pub calls: Mutex<Vec<(HistoryPage, Option<String>)>>,
    pub channels: Mutex<Vec<String>>,
}

impl ScriptedHistory {
    pub fn pages(pages: Vec<Result<Vec<Value>, String>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            ..Default::default()
        }
    }

    pub fn ok(records: Vec<Value>) -> Self {
        Self::pages(vec![Ok(records)])
    }

    pub fn failing(reason: &str) -> Self {
        Self::pages(vec![Err(reason.to_string())])
    }

    /// Every fetch waits for a permit on the returned `Notify`.
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl HistoryFetcher for ScriptedHistory {
    async fn list(
        &self,
        channel_id: &str,
        token: Option<&str>,
        page: HistoryPage,
    ) -> ClientResult<Vec<MessageRecord>> {
        self.channels.lock().unwrap().push(channel_id.to_string());
        self.calls
            .lock()
            .unwrap()
            .push((page, token.map(str::to_owned)));

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let next = self.pages.lock().unwrap().pop_front();
        match next {
            Some(Ok(records)) => Ok(parse_records(records)),
            Some(Err(reason)) => Err(ClientError::HistoryUnavailable(reason)),
            None => Ok(Vec::new()),
        }
    }
}

// ── Live feed ──

pub enum Inbound {
    Text(String),
    Drop(String),
    Close,
}

pub struct ScriptedConnection {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    sent: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

/// The server side of a scripted connection.
pub struct LiveRemote {
    inbound: mpsc::UnboundedSender<Inbound>,
    sent: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

pub fn live_pair() -> (ScriptedConnection, LiveRemote) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (sent_tx, sent_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    (
        ScriptedConnection {
            inbound: in_rx,
            sent: sent_tx,
            closed: Arc::clone(&closed),
        },
        LiveRemote {
            inbound: in_tx,
            sent: sent_rx,
            closed,
        },
    )
}

impl LiveRemote {
    pub fn push(&self, frame: Value) {
        let _ = self.inbound.send(Inbound::Text(frame.to_string()));
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.inbound.send(Inbound::Text(text.to_string()));
    }

    pub fn drop_abnormally(&self, reason: &str) {
        let _ = self.inbound.send(Inbound::Drop(reason.to_string()));
    }

    pub fn close(&self) {
        let _ = self.inbound.send(Inbound::Close);
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Next frame the client sent, parsed as JSON.
    pub async fn next_sent(&mut self) -> Option<Value> {
        let text = tokio::time::timeout(Duration::from_secs(3), self.sent.recv())
            .await
            .ok()??;
        serde_json::from_str(&text).ok()
    }

    /// Stop accepting frames from the client; its next send fails.
    pub fn stop_reading(&mut self) {
        self.sent.close();
    }

    pub fn try_sent(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }
}

#[async_trait]
impl LiveConnection for ScriptedConnection {
    async fn recv(&mut self) -> Option<ClientResult<String>> {
        match self.inbound.recv().await {
            Some(Inbound::Text(text)) => Some(Ok(text)),
            Some(Inbound::Drop(reason)) => Some(Err(ClientError::LiveTransport(reason))),
            Some(Inbound::Close) | None => None,
        }
    }

    async fn send(&mut self, text: String) -> ClientResult<()> {
        self.sent
            .send(text)
            .map_err(|_| ClientError::LiveTransport("remote gone".into()))
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Hands out scripted connections in order; refuses once they run out.
#[derive(Default)]
pub struct ScriptedFeed {
    connections: Mutex<VecDeque<Result<ScriptedConnection, String>>>,
    pub tokens: Mutex<Vec<String>>,
    connects: AtomicUsize,
}

impl ScriptedFeed {
    pub fn new(connections: Vec<Result<ScriptedConnection, String>>) -> Self {
        Self {
            connections: Mutex::new(connections.into()),
            ..Default::default()
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveFeed for ScriptedFeed {
    async fn connect(&self, _channel_id: &str, token: &str) -> ClientResult<Box<dyn LiveConnection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(token.to_string());
        let next = self.connections.lock().unwrap().pop_front();
        match next {
            Some(Ok(conn)) => Ok(Box::new(conn)),
            Some(Err(reason)) => Err(ClientError::LiveTransport(reason)),
            None => Err(ClientError::LiveTransport("connection refused".into())),
        }
    }
}

// ── Client helpers ──

pub fn client(
    history: Arc<ScriptedHistory>,
    feed: Arc<ScriptedFeed>,
    options: TranscriptOptions,
) -> ChannelTranscriptClient {
    ChannelTranscriptClient::new(history, feed, options)
}

/// Waits (up to 3s) for the first event matching `pred`, skipping others.
pub async fn wait_for<F>(handle: &mut TranscriptHandle, pred: F) -> TranscriptEvent
where
    F: Fn(&TranscriptEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match handle.next_event().await {
                Some(event) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("event stream ended"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

pub async fn wait_open(handle: &mut TranscriptHandle) {
    wait_for(handle, |e| {
        matches!(
            e,
            TranscriptEvent::ConnectionChanged(huddle_client::ConnectionState::Open)
        )
    })
    .await;
}

pub async fn wait_history(handle: &mut TranscriptHandle) -> TranscriptEvent {
    wait_for(handle, |e| {
        matches!(
            e,
            TranscriptEvent::HistoryLoaded { .. } | TranscriptEvent::HistoryUnavailable { .. }
        )
    })
    .await
}

pub fn contents(handle: &TranscriptHandle) -> Vec<String> {
    handle.messages().into_iter().map(|m| m.content).collect()
}

pub fn ids(handle: &TranscriptHandle) -> Vec<String> {
    handle.messages().into_iter().map(|m| m.id).collect()
}

/// Gives spawned tasks a chance to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
