/// Expiration timer update: the control message announcing that a
/// conversation's disappearing-messages setting changed.
///
/// Wire format: MessagePack, like every other ToM payload.
use serde::{Deserialize, Serialize};

use crate::error::ExpiryError;
use crate::types::{ExpiryMode, Message};

/// Maximum encoded size accepted by [`ExpirationTimerUpdate::from_bytes`].
pub const MAX_UPDATE_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationTimerUpdate {
    /// Send time (Unix ms).
    pub sent_timestamp: Option<u64>,
    /// Who changed the setting.
    pub sender: Option<String>,
    /// The new setting.
    pub expiry_mode: ExpiryMode,
    /// Set when the change applies to a group.
    pub group_id: Option<String>,
    /// Set on our own linked-device sync copies: the 1-1 peer it applies to.
    pub sync_target: Option<String>,
}

impl ExpirationTimerUpdate {
    pub fn new(expiry_mode: ExpiryMode) -> Self {
        Self {
            sent_timestamp: None,
            sender: None,
            expiry_mode,
            group_id: None,
            sync_target: None,
        }
    }

    pub fn sent_at(mut self, timestamp: u64) -> Self {
        self.sent_timestamp = Some(timestamp);
        self
    }

    pub fn from_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn in_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn synced_to(mut self, target: impl Into<String>) -> Self {
        self.sync_target = Some(target.into());
        self
    }

    pub fn is_group(&self) -> bool {
        self.group_id.is_some()
    }

    /// Thread this update belongs to: group, else sync target, else sender.
    pub fn conversation(&self) -> Option<&str> {
        self.group_id
            .as_deref()
            .or(self.sync_target.as_deref())
            .or(self.sender.as_deref())
    }

    /// The message view the expiration coordinator works on.
    pub fn as_message(&self) -> Message {
        Message {
            sent_timestamp: self.sent_timestamp,
            sender: self.sender.clone(),
            expiry_mode: self.expiry_mode,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ExpiryError> {
        rmp_serde::to_vec(self).map_err(Into::into)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ExpiryError> {
        if data.len() > MAX_UPDATE_SIZE {
            return Err(ExpiryError::MessageTooLarge {
                size: data.len(),
                max: MAX_UPDATE_SIZE,
            });
        }
        rmp_serde::from_slice(data).map_err(Into::into)
    }
}
