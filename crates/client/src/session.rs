use huddle_shared::constants::{UNKNOWN_SENDER_LABEL, VIEWER_SENDER_LABEL};

/// Credentials and viewer identity for one transcript session.
///
/// Passed explicitly to `open`; nothing about the signed-in user is read
/// from process-wide state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    token: Option<String>,
    username: Option<String>,
}

impl Session {
    /// A session without a bearer token. Transcripts opened with it load
    /// history only.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            token: (!token.trim().is_empty()).then_some(token),
            username: None,
        }
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn viewer_name(&self) -> Option<&str> {
        self.username.as_deref()
    }
}

/// How a message without sender metadata is labelled for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderFallback {
    /// Use a fixed label.
    Unknown(String),
    /// Attribute the message to the viewer, using their username or "You".
    Viewer,
}

impl Default for SenderFallback {
    fn default() -> Self {
        SenderFallback::Unknown(UNKNOWN_SENDER_LABEL.to_string())
    }
}

impl SenderFallback {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "viewer" | "you" => SenderFallback::Viewer,
            _ => SenderFallback::default(),
        }
    }

    pub fn label(&self, session: &Session) -> String {
        match self {
            SenderFallback::Unknown(label) => label.clone(),
            SenderFallback::Viewer => session
                .viewer_name()
                .unwrap_or(VIEWER_SENDER_LABEL)
                .to_string(),
        }
    }
}
