mod message;

pub use message::*;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One transcript entry resolved for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedLine {
    pub id: String,
    pub sender: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub edited: bool,
}
