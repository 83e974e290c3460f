use serde::{Deserialize, Serialize};

use crate::models::MessageRecord;

// ── Server → Client Frames ──

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Message(MessagePayload),
    Typing {
        user_id: String,
        #[serde(default)]
        username: Option<String>,
    },
    StoppedTyping {
        user_id: String,
    },
    UserJoined {
        user: PresenceUser,
    },
    UserLeft {
        user_id: String,
        #[serde(default)]
        username: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// A `message` frame carries its record either inline or under `data`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MessagePayload {
    Nested { data: MessageRecord },
    Flat(MessageRecord),
}

impl MessagePayload {
    pub fn into_record(self) -> MessageRecord {
        match self {
            MessagePayload::Nested { data } => data,
            MessagePayload::Flat(record) => record,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PresenceUser {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// Returns `None` for frames that are not JSON objects with a known shape.
pub fn parse_frame(text: &str) -> Option<ServerFrame> {
    match serde_json::from_str::<ServerFrame>(text) {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::debug!("Ignoring unparseable live frame: {}", e);
            None
        }
    }
}

// ── Client → Server Frames ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Message { content: String },
    Typing,
    StoppedTyping,
}

impl ClientFrame {
    /// Text of a message frame, so an unsent message can be handed back.
    pub fn into_content(self) -> Option<String> {
        match self {
            ClientFrame::Message { content } => Some(content),
            _ => None,
        }
    }
}
