/// Application name
pub const APP_NAME: &str = "Parley";

/// Lifetime of an online marker without a heartbeat, in seconds
pub const PRESENCE_TTL_SECS: u64 = 60;

/// How often lapsed online markers are swept from memory, in seconds
pub const PRESENCE_SWEEP_SECS: u64 = 30;

/// Default HTTP / WebSocket port
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Prefix of every conversation broadcast domain name
pub const CONVERSATION_TOPIC_PREFIX: &str = "chat";

/// Prefix of every inbox broadcast domain name
pub const INBOX_TOPIC_PREFIX: &str = "inbox";
