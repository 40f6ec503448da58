/// Errors raised by expiration stores and codecs.
///
/// The coordinator never propagates these: it logs and degrades to a no-op.
#[derive(Debug, thiserror::Error)]
pub enum ExpiryError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("expiration store full ({capacity} messages)")]
    StoreFull { capacity: usize },

    #[error("expiration store lock poisoned")]
    Poisoned,
}

impl From<rmp_serde::encode::Error> for ExpiryError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        ExpiryError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for ExpiryError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        ExpiryError::Deserialization(e.to_string())
    }
}

impl From<serde_json::Error> for ExpiryError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            ExpiryError::Deserialization(e.to_string())
        } else {
            ExpiryError::Serialization(e.to_string())
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for ExpiryError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        ExpiryError::Poisoned
    }
}

/// Why a start request did nothing. Benign, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    /// Message not yet persisted or sent.
    #[error("message has no sent timestamp")]
    MissingSendTimestamp,

    #[error("message has no sender")]
    MissingSender,

    #[error("disappearing messages are off")]
    ExpiryOff,
}
