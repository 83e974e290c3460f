//! REST history fetch.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::{ClientError, ClientResult};
use crate::models::MessageRecord;

/// A window of channel history, as the server paginates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPage {
    pub skip: u32,
    pub limit: u32,
}

impl HistoryPage {
    pub fn first(limit: u32) -> Self {
        Self { skip: 0, limit }
    }
}

/// Source of previously stored channel messages.
#[async_trait]
pub trait HistoryFetcher: Send + Sync {
    async fn list(
        &self,
        channel_id: &str,
        token: Option<&str>,
        page: HistoryPage,
    ) -> ClientResult<Vec<MessageRecord>>;

    /// Replaces the content of a stored message and returns the updated
    /// record.
    async fn edit(
        &self,
        message_id: &str,
        _token: Option<&str>,
        _content: &str,
    ) -> ClientResult<MessageRecord> {
        Err(ClientError::MessageUpdate(format!(
            "editing message {} is not supported",
            message_id
        )))
    }

    /// Deletes a stored message. Deleted messages drop out of history.
    async fn delete(&self, message_id: &str, _token: Option<&str>) -> ClientResult<()> {
        Err(ClientError::MessageUpdate(format!(
            "deleting message {} is not supported",
            message_id
        )))
    }
}

pub const DEFAULT_MESSAGE_PATH: &str = "/messages/{message_id}";

/// History over `GET {api_url}{history_path}?skip=..&limit=..`.
#[derive(Debug, Clone)]
pub struct HttpHistoryFetcher {
    client: Client,
    api_url: String,
    /// Path template; `{channel_id}` is substituted.
    history_path: String,
    /// Path template for edit and delete; `{message_id}` is substituted.
    message_path: String,
}

impl HttpHistoryFetcher {
    pub fn new(
        api_url: impl Into<String>,
        history_path: impl Into<String>,
        timeout: Duration,
    ) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let api_url = api_url.into();
        url::Url::parse(&api_url)
            .map_err(|e| ClientError::Config(format!("Invalid API URL '{}': {}", api_url, e)))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            history_path: history_path.into(),
            message_path: DEFAULT_MESSAGE_PATH.to_string(),
        })
    }

    pub fn with_message_path(mut self, message_path: impl Into<String>) -> Self {
        self.message_path = message_path.into();
        self
    }

    pub fn url_for(&self, channel_id: &str) -> String {
        let path = self
            .history_path
            .replace("{channel_id}", &urlencoding::encode(channel_id));
        format!("{}{}", self.api_url, path)
    }

    pub fn message_url_for(&self, message_id: &str) -> String {
        let path = self
            .message_path
            .replace("{message_id}", &urlencoding::encode(message_id));
        format!("{}{}", self.api_url, path)
    }

    async fn send_update(
        &self,
        method: reqwest::Method,
        message_id: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> ClientResult<reqwest::Response> {
        let url = self.message_url_for(message_id);
        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::MessageUpdate(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::MessageUpdate(format!(
                "{} {} returned {}",
                method, url, status
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl HistoryFetcher for HttpHistoryFetcher {
    async fn list(
        &self,
        channel_id: &str,
        token: Option<&str>,
        page: HistoryPage,
    ) -> ClientResult<Vec<MessageRecord>> {
        let url = self.url_for(channel_id);
        let mut request = self
            .client
            .get(&url)
            .query(&[("skip", page.skip), ("limit", page.limit)]);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::HistoryUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::HistoryUnavailable(format!(
                "GET {} returned {}",
                url, status
            )));
        }

        let body: Vec<Value> = response.json().await.map_err(|e| {
            ClientError::HistoryUnavailable(format!("Failed to parse history: {}", e))
        })?;

        Ok(parse_records(body))
    }

    async fn edit(
        &self,
        message_id: &str,
        token: Option<&str>,
        content: &str,
    ) -> ClientResult<MessageRecord> {
        let response = self
            .send_update(
                reqwest::Method::PUT,
                message_id,
                token,
                Some(json!({ "content": content })),
            )
            .await?;

        response.json().await.map_err(|e| {
            ClientError::MessageUpdate(format!("Failed to parse edited message: {}", e))
        })
    }

    async fn delete(&self, message_id: &str, token: Option<&str>) -> ClientResult<()> {
        self.send_update(reqwest::Method::DELETE, message_id, token, None)
            .await?;
        Ok(())
    }
}

/// Keeps the well-formed records of a page; one bad record does not fail
/// the whole fetch.
pub fn parse_records(body: Vec<Value>) -> Vec<MessageRecord> {
    body.into_iter()
        .filter_map(|raw| match serde_json::from_value::<MessageRecord>(raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!("Skipping malformed history record: {}", e);
                None
            }
        })
        .collect()
}
