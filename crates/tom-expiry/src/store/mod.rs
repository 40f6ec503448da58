/// Expiration storage: where countdowns are committed and where expired
/// messages are destroyed.
///
/// Two implementations with identical semantics:
/// - **Memory**: bounded in-process map, for tests and ephemeral nodes
/// - **Sqlite**: durable, one table per concern
///
/// Both enforce the single-start rule as a compare-and-set on `started_at`.
pub mod memory;
pub mod sqlite;

pub use memory::MemoryExpirationStore;
pub use sqlite::SqliteExpirationStore;

use crate::coordinator::{ExpirationStarter, StartResult, TimerMessageSink};
use crate::error::ExpiryError;
use crate::timer_update::ExpirationTimerUpdate;
use crate::types::{ExpirationTimerState, ExpiryMode, MessageKey};

/// Deletion side of a store, driven by the sweeper.
pub trait ExpirySweep: Send + Sync {
    /// Delete every message whose deadline is `<= now`; return their keys.
    fn remove_expired(&self, now: u64) -> Result<Vec<MessageKey>, ExpiryError>;

    /// Earliest pending deadline, if any countdown is running.
    fn next_expiration(&self) -> Result<Option<u64>, ExpiryError>;
}

/// Either store, as chosen by [`ExpiryConfig::open_store`].
///
/// [`ExpiryConfig::open_store`]: crate::ExpiryConfig::open_store
pub enum ExpiryStore {
    Memory(MemoryExpirationStore),
    Sqlite(SqliteExpirationStore),
}

impl ExpiryStore {
    pub fn is_persistent(&self) -> bool {
        matches!(self, ExpiryStore::Sqlite(_))
    }

    pub fn insert_message(
        &self,
        key: &MessageKey,
        mode: ExpiryMode,
        now: u64,
    ) -> Result<bool, ExpiryError> {
        match self {
            ExpiryStore::Memory(s) => s.insert_message(key, mode, now),
            ExpiryStore::Sqlite(s) => s.insert_message(key, mode, now),
        }
    }

    pub fn timer_state(&self, key: &MessageKey) -> Result<Option<ExpirationTimerState>, ExpiryError> {
        match self {
            ExpiryStore::Memory(s) => s.timer_state(key),
            ExpiryStore::Sqlite(s) => s.timer_state(key),
        }
    }

    pub fn conversation_mode(&self, thread: &str) -> Result<ExpiryMode, ExpiryError> {
        match self {
            ExpiryStore::Memory(s) => s.conversation_mode(thread),
            ExpiryStore::Sqlite(s) => s.conversation_mode(thread),
        }
    }

    pub fn info_messages(&self, thread: &str) -> Result<Vec<ExpirationTimerUpdate>, ExpiryError> {
        match self {
            ExpiryStore::Memory(s) => s.info_messages(thread),
            ExpiryStore::Sqlite(s) => s.info_messages(thread),
        }
    }

    pub fn message_count(&self) -> Result<usize, ExpiryError> {
        match self {
            ExpiryStore::Memory(s) => s.message_count(),
            ExpiryStore::Sqlite(s) => s.message_count(),
        }
    }
}

impl ExpirationStarter for ExpiryStore {
    fn start_any_expiration(
        &self,
        timestamp: u64,
        author: &str,
        expire_started_at: u64,
    ) -> Result<StartResult, ExpiryError> {
        match self {
            ExpiryStore::Memory(s) => s.start_any_expiration(timestamp, author, expire_started_at),
            ExpiryStore::Sqlite(s) => s.start_any_expiration(timestamp, author, expire_started_at),
        }
    }
}

impl TimerMessageSink for ExpiryStore {
    fn insert_expiration_timer_message(
        &self,
        update: &ExpirationTimerUpdate,
    ) -> Result<(), ExpiryError> {
        match self {
            ExpiryStore::Memory(s) => s.insert_expiration_timer_message(update),
            ExpiryStore::Sqlite(s) => s.insert_expiration_timer_message(update),
        }
    }
}

impl ExpirySweep for ExpiryStore {
    fn remove_expired(&self, now: u64) -> Result<Vec<MessageKey>, ExpiryError> {
        match self {
            ExpiryStore::Memory(s) => s.remove_expired(now),
            ExpiryStore::Sqlite(s) => s.remove_expired(now),
        }
    }

    fn next_expiration(&self) -> Result<Option<u64>, ExpiryError> {
        match self {
            ExpiryStore::Memory(s) => s.next_expiration(),
            ExpiryStore::Sqlite(s) => s.next_expiration(),
        }
    }
}
