//! Live WebSocket feed.

pub mod events;

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{ClientError, ClientResult};

/// Opens live connections scoped to one channel.
#[async_trait]
pub trait LiveFeed: Send + Sync {
    async fn connect(&self, channel_id: &str, token: &str) -> ClientResult<Box<dyn LiveConnection>>;
}

/// One established live connection, exclusively owned by its reader task.
#[async_trait]
pub trait LiveConnection: Send {
    /// Next inbound text frame.
    ///
    /// `None` means the peer closed the connection gracefully; `Some(Err)`
    /// is an abnormal drop. Must be cancel-safe.
    async fn recv(&mut self) -> Option<ClientResult<String>>;

    async fn send(&mut self, text: String) -> ClientResult<()>;

    async fn close(&mut self);
}

/// Live feed over `{ws_url}{live_path}?token=..`.
#[derive(Debug, Clone)]
pub struct WsLiveFeed {
    ws_url: String,
    /// Path template; `{channel_id}` is substituted.
    live_path: String,
    connect_timeout: Duration,
}

impl WsLiveFeed {
    pub fn new(
        ws_url: impl Into<String>,
        live_path: impl Into<String>,
        connect_timeout: Duration,
    ) -> ClientResult<Self> {
        let ws_url = ws_url.into();
        let parsed = url::Url::parse(&ws_url)
            .map_err(|e| ClientError::Config(format!("Invalid WebSocket URL '{}': {}", ws_url, e)))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ClientError::Config(format!(
                "WebSocket URL must use ws:// or wss://, got '{}'",
                ws_url
            )));
        }

        Ok(Self {
            ws_url: ws_url.trim_end_matches('/').to_string(),
            live_path: live_path.into(),
            connect_timeout,
        })
    }

    pub fn url_for(&self, channel_id: &str, token: &str) -> ClientResult<url::Url> {
        let path = self
            .live_path
            .replace("{channel_id}", &urlencoding::encode(channel_id));
        let mut url = url::Url::parse(&format!("{}{}", self.ws_url, path))
            .map_err(|e| ClientError::Config(format!("Invalid live URL: {}", e)))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

#[async_trait]
impl LiveFeed for WsLiveFeed {
    async fn connect(&self, channel_id: &str, token: &str) -> ClientResult<Box<dyn LiveConnection>> {
        let url = self.url_for(channel_id, token)?;

        tracing::debug!("Connecting live feed for channel {}", channel_id);

        let (stream, _) = tokio::time::timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await
        .map_err(|_| ClientError::LiveTransport("Timed out opening live connection".into()))?
        .map_err(|e| ClientError::LiveTransport(format!("WebSocket connect failed: {}", e)))?;

        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl LiveConnection for WsConnection {
    async fn recv(&mut self) -> Option<ClientResult<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(frame)) => {
                    return match frame {
                        Some(f) if !matches!(f.code, CloseCode::Normal | CloseCode::Away) => {
                            Some(Err(ClientError::LiveTransport(format!(
                                "Server closed the connection ({}): {}",
                                u16::from(f.code),
                                f.reason.as_str()
                            ))))
                        }
                        _ => None,
                    };
                }
                // Pings are answered by tungstenite itself
                Ok(_) => continue,
                Err(e) => return Some(Err(ClientError::LiveTransport(e.to_string()))),
            }
        }
    }

    async fn send(&mut self, text: String) -> ClientResult<()> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ClientError::LiveTransport(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
