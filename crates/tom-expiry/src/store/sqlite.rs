/// SQLite expiration store.
///
/// Timestamps are stored as INTEGER milliseconds; expiry modes as JSON;
/// timer update info messages as MessagePack blobs.
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::coordinator::{ExpirationStarter, StartResult, TimerMessageSink};
use crate::error::ExpiryError;
use crate::store::ExpirySweep;
use crate::timer_update::ExpirationTimerUpdate;
use crate::types::{ExpirationTimerState, ExpiryMode, MessageKey};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS expiring_messages (
    sent_timestamp    INTEGER NOT NULL,
    author            TEXT    NOT NULL,
    expiry_mode       TEXT    NOT NULL,
    expires_in_ms     INTEGER NOT NULL,
    expire_started_at INTEGER,
    expires_at        INTEGER,
    PRIMARY KEY (sent_timestamp, author)
);
CREATE INDEX IF NOT EXISTS idx_expiring_messages_deadline
    ON expiring_messages (expires_at);
CREATE TABLE IF NOT EXISTS conversation_expiry (
    thread      TEXT PRIMARY KEY,
    expiry_mode TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS timer_updates (
    id     INTEGER PRIMARY KEY AUTOINCREMENT,
    thread TEXT NOT NULL,
    body   BLOB NOT NULL
);
";

fn to_sql(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

fn from_sql(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}

pub struct SqliteExpirationStore {
    conn: Mutex<Connection>,
}

impl SqliteExpirationStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExpiryError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, ExpiryError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, ExpiryError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Register a message. Returns `false` if it was already known.
    ///
    /// The table is unbounded, so `now` is unused.
    pub fn insert_message(
        &self,
        key: &MessageKey,
        mode: ExpiryMode,
        _now: u64,
    ) -> Result<bool, ExpiryError> {
        let conn = self.conn.lock()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO expiring_messages
                (sent_timestamp, author, expiry_mode, expires_in_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                to_sql(key.sent_timestamp),
                key.author,
                serde_json::to_string(&mode)?,
                to_sql(mode.expiry_millis()),
            ],
        )?;
        Ok(changed == 1)
    }

    pub fn timer_state(&self, key: &MessageKey) -> Result<Option<ExpirationTimerState>, ExpiryError> {
        let conn = self.conn.lock()?;
        let row = conn
            .query_row(
                "SELECT expire_started_at, expires_at FROM expiring_messages
                 WHERE sent_timestamp = ?1 AND author = ?2",
                params![to_sql(key.sent_timestamp), key.author],
                |row| {
                    Ok(ExpirationTimerState {
                        started_at: row.get::<_, Option<i64>>(0)?.map(from_sql),
                        expires_at: row.get::<_, Option<i64>>(1)?.map(from_sql),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Current setting of a conversation (`Off` if never set).
    pub fn conversation_mode(&self, thread: &str) -> Result<ExpiryMode, ExpiryError> {
        let conn = self.conn.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT expiry_mode FROM conversation_expiry WHERE thread = ?1",
                params![thread],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(ExpiryMode::Off),
        }
    }

    pub fn info_messages(&self, thread: &str) -> Result<Vec<ExpirationTimerUpdate>, ExpiryError> {
        let conn = self.conn.lock()?;
        let mut stmt =
            conn.prepare("SELECT body FROM timer_updates WHERE thread = ?1 ORDER BY id")?;
        let bodies = stmt
            .query_map(params![thread], |row| row.get::<_, Vec<u8>>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        bodies
            .iter()
            .map(|body| ExpirationTimerUpdate::from_bytes(body))
            .collect()
    }

    pub fn message_count(&self) -> Result<usize, ExpiryError> {
        let conn = self.conn.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM expiring_messages", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl ExpirationStarter for SqliteExpirationStore {
    fn start_any_expiration(
        &self,
        timestamp: u64,
        author: &str,
        expire_started_at: u64,
    ) -> Result<StartResult, ExpiryError> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;

        let row: Option<(i64, Option<i64>)> = tx
            .query_row(
                "SELECT expires_in_ms, expire_started_at FROM expiring_messages
                 WHERE sent_timestamp = ?1 AND author = ?2",
                params![to_sql(timestamp), author],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((expires_in, committed)) = row else {
            return Ok(StartResult::UnknownMessage);
        };
        if expires_in <= 0 {
            return Ok(StartResult::NotExpiring);
        }
        if let Some(started_at) = committed {
            return Ok(StartResult::AlreadyRunning {
                started_at: from_sql(started_at),
            });
        }

        let expires_at = expire_started_at.saturating_add(from_sql(expires_in));
        // Compare-and-set: only an unstarted row is written.
        let changed = tx.execute(
            "UPDATE expiring_messages SET expire_started_at = ?3, expires_at = ?4
             WHERE sent_timestamp = ?1 AND author = ?2 AND expire_started_at IS NULL",
            params![
                to_sql(timestamp),
                author,
                to_sql(expire_started_at),
                to_sql(expires_at)
            ],
        )?;
        tx.commit()?;

        if changed == 0 {
            return Ok(StartResult::UnknownMessage);
        }
        tracing::debug!("expiration started for {author}@{timestamp}, deadline {expires_at}");
        Ok(StartResult::Started {
            started_at: expire_started_at,
            expires_at,
        })
    }
}

impl TimerMessageSink for SqliteExpirationStore {
    fn insert_expiration_timer_message(
        &self,
        update: &ExpirationTimerUpdate,
    ) -> Result<(), ExpiryError> {
        let Some(thread) = update.conversation() else {
            return Ok(());
        };
        let mode = serde_json::to_string(&update.expiry_mode)?;
        let body = update.to_bytes()?;

        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO conversation_expiry (thread, expiry_mode) VALUES (?1, ?2)
             ON CONFLICT(thread) DO UPDATE SET expiry_mode = excluded.expiry_mode",
            params![thread, mode],
        )?;
        tx.execute(
            "INSERT INTO timer_updates (thread, body) VALUES (?1, ?2)",
            params![thread, body],
        )?;
        tx.commit()?;
        Ok(())
    }
}

impl ExpirySweep for SqliteExpirationStore {
    fn remove_expired(&self, now: u64) -> Result<Vec<MessageKey>, ExpiryError> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;
        let keys = {
            let mut stmt = tx.prepare(
                "SELECT sent_timestamp, author FROM expiring_messages
                 WHERE expires_at IS NOT NULL AND expires_at <= ?1
                 ORDER BY sent_timestamp, author",
            )?;
            let rows = stmt.query_map(params![to_sql(now)], |row| {
                Ok(MessageKey::new(from_sql(row.get(0)?), row.get::<_, String>(1)?))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        tx.execute(
            "DELETE FROM expiring_messages WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![to_sql(now)],
        )?;
        tx.commit()?;
        Ok(keys)
    }

    fn next_expiration(&self) -> Result<Option<u64>, ExpiryError> {
        let conn = self.conn.lock()?;
        let min: Option<i64> =
            conn.query_row("SELECT MIN(expires_at) FROM expiring_messages", [], |row| {
                row.get(0)
            })?;
        Ok(min.map(from_sql))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ts: u64) -> MessageKey {
        MessageKey::new(ts, "alice")
    }

    #[test]
    fn start_commits_once() {
        let store = SqliteExpirationStore::open_in_memory().unwrap();
        assert!(store.insert_message(&key(1_000), ExpiryMode::AfterRead(10), 0).unwrap());
        assert!(!store.insert_message(&key(1_000), ExpiryMode::AfterRead(10), 0).unwrap());

        assert_eq!(
            store.start_any_expiration(1_000, "alice", 2_000).unwrap(),
            StartResult::Started {
                started_at: 2_000,
                expires_at: 12_000
            }
        );
        assert_eq!(
            store.start_any_expiration(1_000, "alice", 1_001).unwrap(),
            StartResult::AlreadyRunning { started_at: 2_000 }
        );

        let state = store.timer_state(&key(1_000)).unwrap().unwrap();
        assert_eq!(state.started_at, Some(2_000));
        assert_eq!(state.expires_at, Some(12_000));
    }

    #[test]
    fn unknown_and_disabled() {
        let store = SqliteExpirationStore::open_in_memory().unwrap();
        assert_eq!(
            store.start_any_expiration(1, "alice", 2).unwrap(),
            StartResult::UnknownMessage
        );
        store.insert_message(&key(1), ExpiryMode::Off, 0).unwrap();
        assert_eq!(
            store.start_any_expiration(1, "alice", 2).unwrap(),
            StartResult::NotExpiring
        );
        assert_eq!(store.timer_state(&key(9)).unwrap(), None);
    }

    #[test]
    fn sweep_and_deadline() {
        let store = SqliteExpirationStore::open_in_memory().unwrap();
        store.insert_message(&key(1), ExpiryMode::AfterSend(1), 0).unwrap();
        store.insert_message(&key(2), ExpiryMode::AfterSend(60), 0).unwrap();
        store.start_any_expiration(1, "alice", 1).unwrap();
        store.start_any_expiration(2, "alice", 2).unwrap();

        assert_eq!(store.next_expiration().unwrap(), Some(1_001));
        assert_eq!(store.remove_expired(1_000).unwrap(), Vec::<MessageKey>::new());
        assert_eq!(store.remove_expired(1_001).unwrap(), vec![key(1)]);
        assert_eq!(store.message_count().unwrap(), 1);
        assert_eq!(store.next_expiration().unwrap(), Some(60_002));
    }

    #[test]
    fn timer_updates_roundtrip() {
        let store = SqliteExpirationStore::open_in_memory().unwrap();
        assert_eq!(store.conversation_mode("grp-1").unwrap(), ExpiryMode::Off);

        let first = ExpirationTimerUpdate::new(ExpiryMode::AfterSend(86_400))
            .sent_at(5)
            .from_sender("alice")
            .in_group("grp-1");
        let second = ExpirationTimerUpdate::new(ExpiryMode::Off)
            .sent_at(6)
            .from_sender("bob")
            .in_group("grp-1");
        store.insert_expiration_timer_message(&first).unwrap();
        store.insert_expiration_timer_message(&second).unwrap();

        assert_eq!(store.conversation_mode("grp-1").unwrap(), ExpiryMode::Off);
        assert_eq!(store.info_messages("grp-1").unwrap(), vec![first, second]);
    }
}
