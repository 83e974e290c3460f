// Limits
pub const MAX_MESSAGE_LENGTH: usize = 5000;
pub const MAX_CHANNEL_ID_LENGTH: usize = 64;

// History
pub const HISTORY_PAGE_SIZE: u32 = 50;
pub const HISTORY_PAGE_SIZE_MAX: u32 = 100;

// WebSocket
pub const WS_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const WS_RECONNECT_BASE_DELAY_MS: u64 = 1_000;
pub const WS_RECONNECT_MAX_DELAY_MS: u64 = 30_000;

// Display
pub const UNKNOWN_SENDER_LABEL: &str = "Unknown";
pub const VIEWER_SENDER_LABEL: &str = "You";
