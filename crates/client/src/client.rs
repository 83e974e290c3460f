use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use huddle_shared::constants::HISTORY_PAGE_SIZE;
use huddle_shared::validation::{clamp_history_limit, validate_channel_id, validate_message_content};
use tokio::sync::{mpsc, Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::history::{HistoryFetcher, HistoryPage, HttpHistoryFetcher};
use crate::live::events::{parse_frame, ClientFrame, ServerFrame};
use crate::live::{LiveConnection, LiveFeed, WsLiveFeed};
use crate::models::{ChannelMessage, MessageRecord, RenderedLine};
use crate::reconnect::ReconnectPolicy;
use crate::session::{SenderFallback, Session};
use crate::transcript::Transcript;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Errored,
    /// Waiting to retry; only reachable with a reconnect policy.
    Reconnecting { attempt: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryState {
    Pending,
    Loaded,
    Failed,
}

/// Everything a presentation layer needs to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEvent {
    HistoryLoaded { inserted: usize },
    HistoryUnavailable { reason: String },
    MessageAppended(ChannelMessage),
    /// A message already in the transcript was replaced by its edited version.
    MessageEdited(ChannelMessage),
    MessageDeleted { id: String },
    /// The view should scroll to the newest message.
    ScrollToLatest,
    ConnectionChanged(ConnectionState),
    LiveTransportError { reason: String },
    /// A message that was accepted by `send` but never reached the server.
    SendFailed { content: String },
    Typing {
        user_id: String,
        username: Option<String>,
        active: bool,
    },
    UserJoined {
        user_id: String,
        username: Option<String>,
    },
    UserLeft {
        user_id: String,
        username: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct TranscriptOptions {
    pub history_limit: u32,
    pub reconnect: Option<ReconnectPolicy>,
    pub sender_fallback: SenderFallback,
}

impl Default for TranscriptOptions {
    fn default() -> Self {
        Self {
            history_limit: HISTORY_PAGE_SIZE,
            reconnect: None,
            sender_fallback: SenderFallback::default(),
        }
    }
}

/// Opens channel transcripts against a history source and a live feed.
#[derive(Clone)]
pub struct ChannelTranscriptClient {
    history: Arc<dyn HistoryFetcher>,
    live: Arc<dyn LiveFeed>,
    options: TranscriptOptions,
}

impl ChannelTranscriptClient {
    pub fn new(
        history: Arc<dyn HistoryFetcher>,
        live: Arc<dyn LiveFeed>,
        options: TranscriptOptions,
    ) -> Self {
        Self {
            history,
            live,
            options,
        }
    }

    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        let history = HttpHistoryFetcher::new(
            config.api_url.clone(),
            config.history_path.clone(),
            config.request_timeout,
        )?
        .with_message_path(config.message_path.clone());
        let live = WsLiveFeed::new(
            config.ws_url.clone(),
            config.live_path.clone(),
            config.connect_timeout,
        )?;
        Ok(Self::new(
            Arc::new(history),
            Arc::new(live),
            config.transcript_options(),
        ))
    }

    pub fn options(&self) -> &TranscriptOptions {
        &self.options
    }

    /// Opens a transcript for `channel_id`.
    ///
    /// Returns immediately; history and the live connection are driven by
    /// tasks on the current tokio runtime and report through the handle's
    /// events. Without a token in `session` only history is loaded.
    pub fn open(&self, channel_id: &str, session: &Session) -> ClientResult<TranscriptHandle> {
        validate_channel_id(channel_id).map_err(ClientError::InvalidChannel)?;
        let channel_id = channel_id.trim();
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ClientError::Config("open() requires a tokio runtime".into()))?;

        let token = session.token().map(str::to_owned);
        let history_limit = clamp_history_limit(self.options.history_limit);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let (outbound_tx, outbound_rx) = if token.is_some() {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let shared = Arc::new(Shared {
            channel_id: channel_id.to_string(),
            inner: Mutex::new(Inner {
                transcript: Transcript::new(),
                connection: if token.is_some() {
                    ConnectionState::Connecting
                } else {
                    ConnectionState::Closed
                },
                history: HistoryState::Pending,
                history_fetched: 0,
                outbound: outbound_tx,
                events: Some(events_tx),
                closed: false,
            }),
        });

        // Held by the initial fetch so `load_older` cannot overtake it
        let pages = Arc::new(AsyncMutex::new(()));
        let first_page = Arc::clone(&pages)
            .try_lock_owned()
            .map_err(|_| ClientError::Config("history page lock is already held".into()))?;

        let cancel = CancellationToken::new();
        let mut tasks = Vec::with_capacity(2);

        tasks.push(runtime.spawn(run_history(
            Arc::clone(&shared),
            Arc::clone(&self.history),
            token.clone(),
            HistoryPage::first(history_limit),
            first_page,
        )));

        if let (Some(token), Some(outbound_rx)) = (token.clone(), outbound_rx) {
            tasks.push(runtime.spawn(run_live(
                Arc::clone(&shared),
                Arc::clone(&self.live),
                token,
                self.options.reconnect.clone(),
                outbound_rx,
                cancel.clone(),
            )));
        }

        tracing::info!(
            "Opened transcript for channel {} ({})",
            channel_id,
            if token.is_some() { "live" } else { "history only" }
        );

        Ok(TranscriptHandle {
            shared,
            events: events_rx,
            history: Arc::clone(&self.history),
            token,
            history_limit,
            pages,
            sender_fallback: self.options.sender_fallback.clone(),
            session: session.clone(),
            cancel,
            tasks,
        })
    }
}

struct Inner {
    transcript: Transcript,
    connection: ConnectionState,
    history: HistoryState,
    /// History records consumed so far; the `skip` of the next page.
    history_fetched: u32,
    outbound: Option<mpsc::UnboundedSender<ClientFrame>>,
    events: Option<mpsc::UnboundedSender<TranscriptEvent>>,
    closed: bool,
}

impl Inner {
    fn set_connection(&mut self, state: ConnectionState, events: &mut Vec<TranscriptEvent>) {
        if self.connection != state {
            self.connection = state;
            events.push(TranscriptEvent::ConnectionChanged(state));
        }
    }

    fn queue(&self, frame: ClientFrame) -> ClientResult<()> {
        match (&self.outbound, self.connection) {
            (Some(tx), ConnectionState::Open) => tx.send(frame).map_err(|e| {
                ClientError::Unavailable {
                    unsent: e.0.into_content(),
                }
            }),
            _ => Err(ClientError::Unavailable {
                unsent: frame.into_content(),
            }),
        }
    }
}

struct Shared {
    channel_id: String,
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Critical sections never panic midway, so a poisoned lock is still consistent
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` against the transcript state unless the handle has been
    /// closed, then emits the events it produced. Returns `None` when closed.
    fn apply<R>(&self, f: impl FnOnce(&mut Inner, &mut Vec<TranscriptEvent>) -> R) -> Option<R> {
        let mut inner = self.lock();
        if inner.closed {
            return None;
        }
        let mut events = Vec::new();
        let result = f(&mut inner, &mut events);
        if let Some(tx) = &inner.events {
            for event in events {
                let _ = tx.send(event);
            }
        }
        Some(result)
    }

    fn set_connection(&self, state: ConnectionState) -> bool {
        self.apply(|inner, events| inner.set_connection(state, events))
            .is_some()
    }

    fn emit(&self, event: TranscriptEvent) {
        self.apply(|_, events| events.push(event));
    }

    fn to_messages(&self, records: Vec<MessageRecord>) -> Vec<ChannelMessage> {
        records
            .into_iter()
            .filter_map(|r| match r.into_message(&self.channel_id) {
                Ok(m) => Some(m),
                Err(reason) => {
                    tracing::debug!("Dropping message: {}", reason);
                    None
                }
            })
            .collect()
    }

    fn apply_frame(&self, text: &str) {
        let Some(frame) = parse_frame(text) else {
            return;
        };

        match frame {
            ServerFrame::Message(payload) => {
                let record = payload.into_record();
                let message = match record.into_message(&self.channel_id) {
                    Ok(m) => m,
                    Err(reason) => {
                        tracing::debug!("Dropping live message: {}", reason);
                        return;
                    }
                };
                self.apply(|inner, events| {
                    if inner.transcript.insert(message.clone()) {
                        events.push(TranscriptEvent::MessageAppended(message));
                        events.push(TranscriptEvent::ScrollToLatest);
                    }
                });
            }
            ServerFrame::Typing { user_id, username } => self.emit(TranscriptEvent::Typing {
                user_id,
                username,
                active: true,
            }),
            ServerFrame::StoppedTyping { user_id } => self.emit(TranscriptEvent::Typing {
                user_id,
                username: None,
                active: false,
            }),
            ServerFrame::UserJoined { user } => self.emit(TranscriptEvent::UserJoined {
                user_id: user.id,
                username: user.username,
            }),
            ServerFrame::UserLeft { user_id, username } => {
                self.emit(TranscriptEvent::UserLeft { user_id, username })
            }
            ServerFrame::Unknown => {
                tracing::debug!("Ignoring live frame of unknown type on {}", self.channel_id)
            }
        }
    }
}

/// One open channel session.
///
/// Dropping the handle closes it.
pub struct TranscriptHandle {
    shared: Arc<Shared>,
    events: mpsc::UnboundedReceiver<TranscriptEvent>,
    history: Arc<dyn HistoryFetcher>,
    token: Option<String>,
    history_limit: u32,
    /// Serializes history page loads.
    pages: Arc<AsyncMutex<()>>,
    sender_fallback: SenderFallback,
    session: Session,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl TranscriptHandle {
    pub fn channel_id(&self) -> &str {
        &self.shared.channel_id
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.lock().connection
    }

    pub fn history_state(&self) -> HistoryState {
        self.shared.lock().history
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    pub fn messages(&self) -> Vec<ChannelMessage> {
        self.shared.lock().transcript.to_vec()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().transcript.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().transcript.is_empty()
    }

    /// The transcript resolved for display, oldest first.
    pub fn rendered(&self) -> Vec<RenderedLine> {
        let fallback = self.sender_fallback.label(&self.session);
        self.shared
            .lock()
            .transcript
            .iter()
            .map(|m| RenderedLine {
                id: m.id.clone(),
                sender: m.sender_name.clone().unwrap_or_else(|| fallback.clone()),
                content: m.content.clone(),
                created_at: m.created_at,
                edited: m.edited,
            })
            .collect()
    }

    /// Waits for the next event. Returns `None` once the handle is closed
    /// and all earlier events have been drained.
    pub async fn next_event(&mut self) -> Option<TranscriptEvent> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<TranscriptEvent> {
        self.events.try_recv().ok()
    }

    /// Queues `text` on the live connection.
    ///
    /// The transcript is not touched; the message shows up once the server
    /// echoes it back. Fails with `Unavailable`, handing the text back,
    /// unless the connection is open.
    pub fn send(&self, text: impl Into<String>) -> ClientResult<()> {
        let text = text.into();
        let inner = self.shared.lock();
        if inner.closed || inner.connection != ConnectionState::Open {
            return Err(ClientError::Unavailable { unsent: Some(text) });
        }
        validate_message_content(&text).map_err(ClientError::InvalidMessage)?;
        inner.queue(ClientFrame::Message { content: text })
    }

    pub fn set_typing(&self, active: bool) -> ClientResult<()> {
        let inner = self.shared.lock();
        if inner.closed {
            return Err(ClientError::Unavailable { unsent: None });
        }
        inner.queue(if active {
            ClientFrame::Typing
        } else {
            ClientFrame::StoppedTyping
        })
    }

    /// Fetches the next page of older history and merges it in. Returns the
    /// number of messages that were not already in the transcript.
    ///
    /// Waits for the initial history fetch and for any other page load in
    /// progress, so every call reads the next unseen page.
    pub async fn load_older(&self) -> ClientResult<usize> {
        let _page_lock = self.pages.lock().await;
        let skip = {
            let inner = self.shared.lock();
            if inner.closed {
                return Err(ClientError::Closed);
            }
            inner.history_fetched
        };

        let page = HistoryPage {
            skip,
            limit: self.history_limit,
        };
        let records = self
            .history
            .list(&self.shared.channel_id, self.token.as_deref(), page)
            .await?;
        let fetched = records.len() as u32;
        let messages = self.shared.to_messages(records);

        self.shared
            .apply(|inner, events| {
                inner.history_fetched += fetched;
                inner.history = HistoryState::Loaded;
                let inserted = inner.transcript.extend(messages);
                if inserted > 0 {
                    events.push(TranscriptEvent::HistoryLoaded { inserted });
                }
                inserted
            })
            .ok_or(ClientError::Closed)
    }

    /// Edits a message on the server and swaps the server's updated version
    /// into the transcript.
    pub async fn edit(
        &self,
        message_id: &str,
        text: impl Into<String>,
    ) -> ClientResult<ChannelMessage> {
        let text = text.into();
        validate_message_content(&text).map_err(ClientError::InvalidMessage)?;
        if self.is_closed() {
            return Err(ClientError::Closed);
        }

        let record = self
            .history
            .edit(message_id, self.token.as_deref(), &text)
            .await?;
        let message = record
            .into_message(&self.shared.channel_id)
            .map_err(ClientError::MessageUpdate)?;

        self.shared
            .apply(|inner, events| {
                if inner.transcript.replace(message.clone()) {
                    events.push(TranscriptEvent::MessageEdited(message.clone()));
                }
            })
            .ok_or(ClientError::Closed)?;
        Ok(message)
    }

    /// Deletes a message on the server and drops it from the transcript.
    pub async fn delete(&self, message_id: &str) -> ClientResult<()> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }

        self.history
            .delete(message_id, self.token.as_deref())
            .await?;

        self.shared
            .apply(|inner, events| {
                if inner.transcript.remove(message_id).is_some() {
                    events.push(TranscriptEvent::MessageDeleted {
                        id: message_id.to_string(),
                    });
                }
            })
            .ok_or(ClientError::Closed)
    }

    /// Closes the live connection and stops all work for this handle.
    ///
    /// Idempotent. Anything the old tasks produce afterwards is discarded.
    pub fn close(&mut self) {
        {
            let mut inner = self.shared.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.connection = ConnectionState::Closed;
            inner.outbound = None;
            inner.events = None;
        }

        self.cancel.cancel();
        // The live task closes its transport on cancellation
        if let Some(history) = self.tasks.first() {
            history.abort();
        }
        tracing::info!("Closed transcript for channel {}", self.shared.channel_id);
    }

    /// Closes the handle and waits for its tasks to finish, including the
    /// live transport's close handshake.
    pub async fn shutdown(mut self) {
        self.close();
        for task in std::mem::take(&mut self.tasks) {
            let _ = task.await;
        }
    }
}

impl Drop for TranscriptHandle {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_history(
    shared: Arc<Shared>,
    fetcher: Arc<dyn HistoryFetcher>,
    token: Option<String>,
    page: HistoryPage,
    _page_lock: OwnedMutexGuard<()>,
) {
    let result = fetcher
        .list(&shared.channel_id, token.as_deref(), page)
        .await;

    let outcome = result.map(|records| (records.len() as u32, shared.to_messages(records)));
    let applied = shared.apply(|inner, events| match outcome {
        Ok((fetched, messages)) => {
            inner.history_fetched += fetched;
            inner.history = HistoryState::Loaded;
            let inserted = inner.transcript.extend(messages);
            events.push(TranscriptEvent::HistoryLoaded { inserted });
            events.push(TranscriptEvent::ScrollToLatest);
        }
        Err(e) => {
            tracing::warn!("History fetch failed for channel {}: {}", shared.channel_id, e);
            inner.history = HistoryState::Failed;
            events.push(TranscriptEvent::HistoryUnavailable {
                reason: e.to_string(),
            });
        }
    });

    if applied.is_none() {
        tracing::debug!("Discarding history for closed channel {}", shared.channel_id);
    }
}

enum LiveOutcome {
    Cancelled,
    ClosedByPeer,
    Failed(String),
}

async fn run_live(
    shared: Arc<Shared>,
    feed: Arc<dyn LiveFeed>,
    token: String,
    policy: Option<ReconnectPolicy>,
    mut outbound: mpsc::UnboundedReceiver<ClientFrame>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        if !shared.set_connection(ConnectionState::Connecting) {
            return;
        }

        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            res = feed.connect(&shared.channel_id, &token) => res,
        };

        let outcome = match connected {
            Ok(mut conn) => {
                if !shared.set_connection(ConnectionState::Open) {
                    conn.close().await;
                    return;
                }
                attempt = 0;
                tracing::info!("Live feed open for channel {}", shared.channel_id);
                pump(&shared, conn.as_mut(), &mut outbound, &cancel).await
            }
            Err(e) => LiveOutcome::Failed(e.to_string()),
        };

        let reason = match outcome {
            LiveOutcome::Cancelled => return,
            LiveOutcome::ClosedByPeer => {
                tracing::info!("Live feed closed by server for channel {}", shared.channel_id);
                shared.set_connection(ConnectionState::Closed);
                return;
            }
            LiveOutcome::Failed(reason) => reason,
        };

        tracing::warn!("Live feed failed for channel {}: {}", shared.channel_id, reason);
        attempt += 1;
        let retry = policy.as_ref().filter(|p| p.allows(attempt));

        let still_open = shared.apply(|inner, events| {
            events.push(TranscriptEvent::LiveTransportError { reason });
            // Frames queued against the dead connection never went out
            while let Ok(frame) = outbound.try_recv() {
                if let Some(content) = frame.into_content() {
                    events.push(TranscriptEvent::SendFailed { content });
                }
            }
            let next = match retry {
                Some(_) => ConnectionState::Reconnecting { attempt },
                None => ConnectionState::Errored,
            };
            inner.set_connection(next, events);
        });

        let Some(policy) = retry else {
            return;
        };
        if still_open.is_none() {
            return;
        }

        let delay = policy.delay_for(attempt);
        tracing::info!(
            "Reconnecting live feed for channel {} in {:?} (attempt {})",
            shared.channel_id,
            delay,
            attempt
        );
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn pump(
    shared: &Shared,
    conn: &mut dyn LiveConnection,
    outbound: &mut mpsc::UnboundedReceiver<ClientFrame>,
    cancel: &CancellationToken,
) -> LiveOutcome {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                conn.close().await;
                return LiveOutcome::Cancelled;
            }
            inbound = conn.recv() => match inbound {
                Some(Ok(text)) => shared.apply_frame(&text),
                Some(Err(e)) => return LiveOutcome::Failed(e.to_string()),
                None => return LiveOutcome::ClosedByPeer,
            },
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    conn.close().await;
                    return LiveOutcome::Cancelled;
                };
                let text = match serde_json::to_string(&frame) {
                    Ok(t) => t,
                    Err(_) => continue,
                };
                if let Err(e) = conn.send(text).await {
                    if let Some(content) = frame.into_content() {
                        shared.emit(TranscriptEvent::SendFailed { content });
                    }
                    return LiveOutcome::Failed(e.to_string());
                }
            }
        }
    }
}
