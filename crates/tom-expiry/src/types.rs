use serde::{Deserialize, Serialize};

/// Disappearing-message policy for a message or a conversation.
///
/// Durations are in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExpiryMode {
    #[default]
    Off,
    /// Countdown starts when the message is sent.
    AfterSend(u64),
    /// Countdown starts when the message is first read.
    AfterRead(u64),
}

impl ExpiryMode {
    /// Configured duration in seconds (0 when off).
    pub fn expiry_seconds(&self) -> u64 {
        match self {
            ExpiryMode::Off => 0,
            ExpiryMode::AfterSend(s) | ExpiryMode::AfterRead(s) => *s,
        }
    }

    /// Configured duration in milliseconds (0 when off).
    pub fn expiry_millis(&self) -> u64 {
        self.expiry_seconds().saturating_mul(1000)
    }

    /// Whether messages under this mode disappear at all.
    pub fn is_enabled(&self) -> bool {
        self.expiry_millis() > 0
    }
}

/// The fields of a message the expiration logic looks at.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    /// Send time (Unix ms). `None` until the message is persisted/sent.
    pub sent_timestamp: Option<u64>,
    /// Author identity.
    pub sender: Option<String>,
    pub expiry_mode: ExpiryMode,
}

impl Message {
    pub fn new(sent_timestamp: u64, sender: impl Into<String>, expiry_mode: ExpiryMode) -> Self {
        Self {
            sent_timestamp: Some(sent_timestamp),
            sender: Some(sender.into()),
            expiry_mode,
        }
    }

    /// Storage key, if both parts are known.
    pub fn key(&self) -> Option<MessageKey> {
        Some(MessageKey::new(self.sent_timestamp?, self.sender.clone()?))
    }
}

/// How stores identify a message: send timestamp plus author.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageKey {
    pub sent_timestamp: u64,
    pub author: String,
}

impl MessageKey {
    pub fn new(sent_timestamp: u64, author: impl Into<String>) -> Self {
        Self {
            sent_timestamp,
            author: author.into(),
        }
    }
}

impl std::fmt::Display for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.author, self.sent_timestamp)
    }
}

/// Expiration progress of a single message.
///
/// `started_at` is written once and never rewound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExpirationTimerState {
    /// Absolute deletion deadline (Unix ms).
    pub expires_at: Option<u64>,
    /// When the countdown began (Unix ms).
    pub started_at: Option<u64>,
}

impl ExpirationTimerState {
    /// State for a countdown starting at `started_at` under `mode`.
    pub fn started(started_at: u64, mode: ExpiryMode) -> Self {
        Self {
            expires_at: Some(started_at.saturating_add(mode.expiry_millis())),
            started_at: Some(started_at),
        }
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }

    /// Remaining time in ms (0 if expired or not started).
    pub fn remaining(&self, now: u64) -> u64 {
        self.expires_at.map_or(0, |deadline| deadline.saturating_sub(now))
    }
}

/// Current Unix time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
