//! Client error types.

use thiserror::Error;

/// Result type for transcript client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised by the transcript client and its collaborators.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The REST history fetch failed (transport, status or body).
    #[error("Message history unavailable: {0}")]
    HistoryUnavailable(String),

    /// The live connection failed to establish or dropped abnormally.
    #[error("Live connection failed: {0}")]
    LiveTransport(String),

    /// An outbound frame was attempted while the live connection is not open.
    /// Carries the unsent message text, if any, so the caller can retry.
    #[error("Live connection is not open")]
    Unavailable { unsent: Option<String> },

    /// An edit or delete was refused by the server or never reached it.
    #[error("Message update failed: {0}")]
    MessageUpdate(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    /// The transcript handle was closed.
    #[error("Transcript handle is closed")]
    Closed,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Takes back the text of a send that never left the client.
    pub fn into_unsent(self) -> Option<String> {
        match self {
            ClientError::Unavailable { unsent } => unsent,
            _ => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, ClientError::Unavailable { .. })
    }
}
