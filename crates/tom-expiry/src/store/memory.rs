/// In-memory expiration store.
///
/// Bounded: once `capacity` messages are tracked, new inserts are refused
/// until the sweeper frees room. Only [`ExpirySweep::remove_expired`]
/// deletes expired entries, so every deletion is reported.
use std::collections::HashMap;
use std::sync::Mutex;

use crate::coordinator::{ExpirationStarter, StartResult, TimerMessageSink};
use crate::error::ExpiryError;
use crate::store::ExpirySweep;
use crate::timer_update::ExpirationTimerUpdate;
use crate::types::{ExpirationTimerState, ExpiryMode, MessageKey};

/// Default capacity (DoS protection).
pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
struct TrackedMessage {
    mode: ExpiryMode,
    timer: ExpirationTimerState,
}

#[derive(Debug, Default)]
struct Inner {
    messages: HashMap<MessageKey, TrackedMessage>,
    /// Current setting per conversation.
    conversations: HashMap<String, ExpiryMode>,
    /// Timer update info messages per conversation, in arrival order.
    updates: HashMap<String, Vec<ExpirationTimerUpdate>>,
}

pub struct MemoryExpirationStore {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl MemoryExpirationStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity,
        }
    }

    /// Register a message. Returns `false` if it was already known.
    ///
    /// `now` is only used for logging; a full store is not pruned here.
    pub fn insert_message(
        &self,
        key: &MessageKey,
        mode: ExpiryMode,
        now: u64,
    ) -> Result<bool, ExpiryError> {
        let mut inner = self.inner.lock()?;
        if inner.messages.contains_key(key) {
            return Ok(false);
        }
        if inner.messages.len() >= self.capacity {
            tracing::warn!("expiration store full at {now}, refusing {key}");
            return Err(ExpiryError::StoreFull {
                capacity: self.capacity,
            });
        }
        inner.messages.insert(
            key.clone(),
            TrackedMessage {
                mode,
                timer: ExpirationTimerState::default(),
            },
        );
        Ok(true)
    }

    pub fn timer_state(&self, key: &MessageKey) -> Result<Option<ExpirationTimerState>, ExpiryError> {
        let inner = self.inner.lock()?;
        Ok(inner.messages.get(key).map(|m| m.timer))
    }

    pub fn contains(&self, key: &MessageKey) -> Result<bool, ExpiryError> {
        Ok(self.inner.lock()?.messages.contains_key(key))
    }

    /// Current setting of a conversation (`Off` if never set).
    pub fn conversation_mode(&self, thread: &str) -> Result<ExpiryMode, ExpiryError> {
        let inner = self.inner.lock()?;
        Ok(inner.conversations.get(thread).copied().unwrap_or_default())
    }

    pub fn info_messages(&self, thread: &str) -> Result<Vec<ExpirationTimerUpdate>, ExpiryError> {
        let inner = self.inner.lock()?;
        Ok(inner.updates.get(thread).cloned().unwrap_or_default())
    }

    pub fn message_count(&self) -> Result<usize, ExpiryError> {
        Ok(self.inner.lock()?.messages.len())
    }

    pub fn remove(&self, key: &MessageKey) -> Result<bool, ExpiryError> {
        Ok(self.inner.lock()?.messages.remove(key).is_some())
    }
}

impl Default for MemoryExpirationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpirationStarter for MemoryExpirationStore {
    fn start_any_expiration(
        &self,
        timestamp: u64,
        author: &str,
        expire_started_at: u64,
    ) -> Result<StartResult, ExpiryError> {
        let mut inner = self.inner.lock()?;
        let key = MessageKey::new(timestamp, author);
        let Some(entry) = inner.messages.get_mut(&key) else {
            return Ok(StartResult::UnknownMessage);
        };
        if !entry.mode.is_enabled() {
            return Ok(StartResult::NotExpiring);
        }
        // Single start: a committed value is never moved.
        if let Some(started_at) = entry.timer.started_at {
            return Ok(StartResult::AlreadyRunning { started_at });
        }
        entry.timer = ExpirationTimerState::started(expire_started_at, entry.mode);
        let expires_at = entry.timer.expires_at.unwrap_or(expire_started_at);
        tracing::debug!("expiration started for {key}, deadline {expires_at}");
        Ok(StartResult::Started {
            started_at: expire_started_at,
            expires_at,
        })
    }
}

impl TimerMessageSink for MemoryExpirationStore {
    fn insert_expiration_timer_message(
        &self,
        update: &ExpirationTimerUpdate,
    ) -> Result<(), ExpiryError> {
        let Some(thread) = update.conversation() else {
            return Ok(());
        };
        let mut inner = self.inner.lock()?;
        inner
            .conversations
            .insert(thread.to_string(), update.expiry_mode);
        inner
            .updates
            .entry(thread.to_string())
            .or_default()
            .push(update.clone());
        Ok(())
    }
}

impl ExpirySweep for MemoryExpirationStore {
    fn remove_expired(&self, now: u64) -> Result<Vec<MessageKey>, ExpiryError> {
        let mut inner = self.inner.lock()?;
        let mut expired: Vec<MessageKey> = inner
            .messages
            .iter()
            .filter(|(_, m)| m.timer.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.messages.remove(key);
        }
        expired.sort();
        Ok(expired)
    }

    fn next_expiration(&self) -> Result<Option<u64>, ExpiryError> {
        let inner = self.inner.lock()?;
        Ok(inner
            .messages
            .values()
            .filter_map(|m| m.timer.expires_at)
            .min())
    }
}
