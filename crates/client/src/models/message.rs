use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

/// A message as held in a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMessage {
    pub id: String,
    pub channel_id: String,
    pub sender_id: Option<String>,
    pub sender_name: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub edited: bool,
}

/// A message as the server sends it, either from the history endpoint or
/// inside a live `message` frame.
///
/// Live frames may omit `id`; those get an id derived from their content.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageRecord {
    #[serde(default, deserialize_with = "de_id")]
    pub id: String,
    pub content: String,
    #[serde(alias = "createdAt", alias = "timestamp", deserialize_with = "de_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, alias = "channelId")]
    pub channel_id: Option<String>,
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
    #[serde(default, alias = "user")]
    pub sender: Option<SenderRecord>,
    #[serde(default, alias = "isEdited")]
    pub is_edited: bool,
    #[serde(default, alias = "isDeleted")]
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SenderRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl MessageRecord {
    /// Validates the record against the channel it is being loaded into.
    pub fn into_message(mut self, channel_id: &str) -> Result<ChannelMessage, String> {
        if self.content.is_empty() {
            return Err(format!("message {} has no content", self.id));
        }
        if self.is_deleted {
            return Err(format!("message {} is deleted", self.id));
        }
        if self.id.is_empty() {
            self.id = self.derived_id(channel_id);
        }
        if let Some(owner) = &self.channel_id {
            if owner != channel_id {
                return Err(format!(
                    "message {} belongs to channel {}, not {}",
                    self.id, owner, channel_id
                ));
            }
        }

        let (sender_id, sender_name) = match self.sender {
            Some(sender) => (sender.id.or(self.user_id), sender.username),
            None => (self.user_id, None),
        };

        Ok(ChannelMessage {
            id: self.id,
            channel_id: channel_id.to_string(),
            sender_id,
            sender_name,
            content: self.content,
            created_at: self.created_at,
            edited: self.is_edited,
        })
    }

    /// Stable id for a record the server sent without one: a digest of
    /// channel, sender, timestamp and content. The same frame delivered
    /// twice maps to the same id; it never matches a server-assigned id.
    pub fn derived_id(&self, channel_id: &str) -> String {
        let sender = self
            .sender
            .as_ref()
            .and_then(|s| s.id.as_deref().or(s.username.as_deref()))
            .or(self.user_id.as_deref())
            .unwrap_or_default();

        let timestamp = self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true);

        let mut hasher = Sha256::new();
        for part in [channel_id, sender, timestamp.as_str(), self.content.as_str()] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        let digest = format!("{:x}", hasher.finalize());
        format!("live-{}", &digest[..32])
    }
}

/// Parses RFC 3339 timestamps as well as naive ISO-8601 ones, which are
/// taken to be UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn de_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}
