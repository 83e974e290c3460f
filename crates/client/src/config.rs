use std::env;
use std::time::Duration;

use huddle_shared::constants::{HISTORY_PAGE_SIZE, WS_CONNECT_TIMEOUT_MS};

use crate::client::TranscriptOptions;
use crate::history::DEFAULT_MESSAGE_PATH;
use crate::reconnect::ReconnectPolicy;
use crate::session::{SenderFallback, Session};

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_url: String,
    pub ws_url: String,
    pub history_path: String,
    pub live_path: String,
    pub message_path: String,
    pub token: Option<String>,
    pub username: Option<String>,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub history_limit: u32,
    pub reconnect_attempts: u32,
    pub sender_fallback: SenderFallback,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_url = get("HUDDLE_API_URL").unwrap_or_else(|| "http://localhost:8000/api".into());
        let ws_url = get("HUDDLE_WS_URL").unwrap_or_else(|| derive_ws_url(&api_url));

        Self {
            ws_url,
            api_url,
            history_path: get("HUDDLE_HISTORY_PATH")
                .unwrap_or_else(|| "/messages/{channel_id}".into()),
            live_path: get("HUDDLE_LIVE_PATH")
                .unwrap_or_else(|| "/ws/channels/{channel_id}".into()),
            message_path: get("HUDDLE_MESSAGE_PATH")
                .unwrap_or_else(|| DEFAULT_MESSAGE_PATH.into()),
            token: get("HUDDLE_TOKEN"),
            username: get("HUDDLE_USERNAME"),
            request_timeout: Duration::from_secs(
                get("HUDDLE_REQUEST_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            ),
            connect_timeout: Duration::from_millis(WS_CONNECT_TIMEOUT_MS),
            history_limit: get("HUDDLE_HISTORY_LIMIT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(HISTORY_PAGE_SIZE),
            reconnect_attempts: get("HUDDLE_RECONNECT_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            sender_fallback: get("HUDDLE_SENDER_FALLBACK")
                .map(|v| SenderFallback::parse(&v))
                .unwrap_or_default(),
        }
    }

    pub fn session(&self) -> Session {
        let session = match &self.token {
            Some(token) => Session::with_token(token.clone()),
            None => Session::anonymous(),
        };
        match &self.username {
            Some(name) => session.username(name.clone()),
            None => session,
        }
    }

    pub fn transcript_options(&self) -> TranscriptOptions {
        TranscriptOptions {
            history_limit: self.history_limit,
            reconnect: (self.reconnect_attempts > 0)
                .then(|| ReconnectPolicy::new(self.reconnect_attempts)),
            sender_fallback: self.sender_fallback.clone(),
        }
    }
}

/// `http(s)://host/api` -> `ws(s)://host/api`
fn derive_ws_url(api_url: &str) -> String {
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        api_url.to_string()
    }
}
