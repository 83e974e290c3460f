pub mod client;
pub mod config;
pub mod error;
pub mod history;
pub mod live;
pub mod models;
pub mod reconnect;
pub mod session;
pub mod transcript;

pub use client::{
    ChannelTranscriptClient, ConnectionState, HistoryState, TranscriptEvent, TranscriptHandle,
    TranscriptOptions,
};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use session::{SenderFallback, Session};
