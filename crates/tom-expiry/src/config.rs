use std::path::PathBuf;
use std::time::Duration;

use crate::clock::OffsetClock;
use crate::error::ExpiryError;
use crate::store::memory::DEFAULT_CAPACITY;
use crate::store::{ExpiryStore, MemoryExpirationStore, SqliteExpirationStore};

/// Environment variable naming the SQLite database file.
pub const DB_PATH_ENV: &str = "TOM_EXPIRY_DB";

/// Configuration for the expiration subsystem.
///
/// All fields have sensible defaults. Use the builder pattern:
///
/// ```rust
/// use std::time::Duration;
/// use tom_expiry::ExpiryConfig;
///
/// let config = ExpiryConfig::new()
///     .sweep_interval(Duration::from_millis(500))
///     .max_tracked_messages(1_000);
/// ```
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Capacity of the in-memory store.
    pub(crate) max_tracked_messages: usize,
    /// How often the sweeper deletes expired messages.
    pub(crate) sweep_interval: Duration,
    /// SQLite file. `None` keeps everything in memory.
    pub(crate) database_path: Option<PathBuf>,
    /// Initial network clock offset (ms).
    pub(crate) clock_offset_ms: i64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpiryConfig {
    /// Create a new config with defaults.
    ///
    /// If the `TOM_EXPIRY_DB` environment variable is set, it is used as the
    /// database path. This can be overridden with [`.database_path()`].
    ///
    /// [`.database_path()`]: ExpiryConfig::database_path
    pub fn new() -> Self {
        let database_path = std::env::var_os(DB_PATH_ENV)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        Self {
            max_tracked_messages: DEFAULT_CAPACITY,
            sweep_interval: Duration::from_secs(1),
            database_path,
            clock_offset_ms: 0,
        }
    }

    /// Set the in-memory store capacity (default: 10 000).
    pub fn max_tracked_messages(mut self, n: usize) -> Self {
        self.max_tracked_messages = n;
        self
    }

    /// Set the sweeper interval (default: 1s).
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Persist to a SQLite file.
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Keep everything in memory, ignoring `TOM_EXPIRY_DB`.
    pub fn in_memory(mut self) -> Self {
        self.database_path = None;
        self
    }

    /// Set the initial network clock offset (default: 0).
    pub fn clock_offset_ms(mut self, offset: i64) -> Self {
        self.clock_offset_ms = offset;
        self
    }

    pub fn get_sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    pub fn get_database_path(&self) -> Option<&PathBuf> {
        self.database_path.as_ref()
    }

    pub fn clock(&self) -> OffsetClock {
        OffsetClock::new(self.clock_offset_ms)
    }

    pub fn memory_store(&self) -> MemoryExpirationStore {
        MemoryExpirationStore::with_capacity(self.max_tracked_messages)
    }

    /// The SQLite file when a database path is set, otherwise a memory store
    /// bounded by `max_tracked_messages`.
    pub fn open_store(&self) -> Result<ExpiryStore, ExpiryError> {
        match &self.database_path {
            Some(path) => {
                tracing::info!("expiration store: {}", path.display());
                Ok(ExpiryStore::Sqlite(SqliteExpirationStore::open(path)?))
            }
            None => {
                tracing::info!(
                    "expiration store: memory (capacity {})",
                    self.max_tracked_messages
                );
                Ok(ExpiryStore::Memory(self.memory_store()))
            }
        }
    }

    /// Open the configured SQLite file, or an in-memory database if unset.
    pub fn sqlite_store(&self) -> Result<SqliteExpirationStore, ExpiryError> {
        match &self.database_path {
            Some(path) => {
                tracing::info!("expiration store: {}", path.display());
                SqliteExpirationStore::open(path)
            }
            None => SqliteExpirationStore::open_in_memory(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExpiryMode, MessageKey};

    #[test]
    fn builder_overrides() {
        let config = ExpiryConfig::new()
            .in_memory()
            .sweep_interval(Duration::from_millis(250))
            .max_tracked_messages(3)
            .clock_offset_ms(-500);

        assert_eq!(config.get_sweep_interval(), Duration::from_millis(250));
        assert!(config.get_database_path().is_none());
        assert_eq!(config.clock().offset(), -500);
        assert_eq!(config.max_tracked_messages, 3);
    }

    #[test]
    fn database_path_opens_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expiry.db");
        let config = ExpiryConfig::new().database_path(&path);

        let store = config.sqlite_store().unwrap();
        assert_eq!(store.message_count().unwrap(), 0);
        assert!(path.exists());
    }

    #[test]
    fn open_store_without_path_is_bounded_memory() {
        let store = ExpiryConfig::new()
            .in_memory()
            .max_tracked_messages(1)
            .open_store()
            .unwrap();
        assert!(!store.is_persistent());

        store
            .insert_message(&MessageKey::new(1, "alice"), ExpiryMode::Off, 0)
            .unwrap();
        let err = store
            .insert_message(&MessageKey::new(2, "alice"), ExpiryMode::Off, 0)
            .unwrap_err();
        assert!(matches!(err, ExpiryError::StoreFull { capacity: 1 }));
    }

    #[test]
    fn open_store_with_path_is_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expiry.db");
        let config = ExpiryConfig::new().database_path(&path).max_tracked_messages(1);

        let store = config.open_store().unwrap();
        assert!(store.is_persistent());
        for ts in 1..=3 {
            store
                .insert_message(&MessageKey::new(ts, "alice"), ExpiryMode::AfterSend(5), 0)
                .unwrap();
        }
        assert_eq!(store.message_count().unwrap(), 3);
        assert!(path.exists());
    }

    #[test]
    fn in_memory_sqlite_when_unset() {
        let store = ExpiryConfig::new().in_memory().sqlite_store().unwrap();
        assert_eq!(store.message_count().unwrap(), 0);
    }
}
