/// Text for control messages: expiration changes, group updates,
/// data-extraction notices, and calls.
///
/// English templates only. Sender names come from an injected
/// [`SenderNames`] lookup, falling back to a truncated id.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::display::{expiration_display_value, expiration_type_display_value};
use crate::error::ExpiryError;

/// Subject used for the local user.
pub const YOU: &str = "You";

/// Resolves a sender id to the name the user knows them by.
pub trait SenderNames: Send + Sync {
    fn display_name(&self, sender_id: &str) -> Option<String>;
}

impl SenderNames for HashMap<String, String> {
    fn display_name(&self, sender_id: &str) -> Option<String> {
        self.get(sender_id).cloned()
    }
}

/// Short form of a long id: first 4 and last 4 characters.
pub fn truncate_id_for_display(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    if chars.len() <= 8 {
        return id.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}

/// Known name for `sender_id`, else its truncated form.
pub fn sender_display_name<N: SenderNames + ?Sized>(names: &N, sender_id: &str) -> String {
    names
        .display_name(sender_id)
        .unwrap_or_else(|| truncate_id_for_display(sender_id))
}

// ── Expiration timer text ────────────────────────────────────────────────

/// Describe a disappearing-messages setting change.
///
/// `duration` is in seconds; zero or negative means "turned off". The
/// action reads "send" when `timestamp >= expire_started_at`, "read"
/// otherwise. Incoming changes with no sender produce an empty string.
pub fn render_expiration_change_text<N: SenderNames + ?Sized>(
    names: &N,
    duration: i64,
    is_group: bool,
    sender_id: Option<&str>,
    is_outgoing: bool,
    timestamp: u64,
    expire_started_at: u64,
) -> String {
    let sender_name = match (is_outgoing, sender_id) {
        (true, _) => YOU.to_string(),
        (false, Some(id)) => sender_display_name(names, id),
        (false, None) => return String::new(),
    };

    if duration <= 0 {
        return if is_group {
            format!("{sender_name} turned off disappearing messages")
        } else if is_outgoing {
            format!(
                "{sender_name} turned off disappearing messages. \
                 Messages you send will no longer disappear"
            )
        } else {
            format!(
                "{sender_name} turned off disappearing messages. \
                 Messages they send will no longer disappear"
            )
        };
    }

    let time = expiration_display_value(duration);
    let action = expiration_type_display_value(timestamp >= expire_started_at);
    if is_group {
        format!("{sender_name} set messages in this group to disappear {time} after {action}")
    } else {
        format!("{sender_name} set messages to disappear {time} after {action}")
    }
}

// ── Group update text ────────────────────────────────────────────────────

/// What changed in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateKind {
    GroupCreation,
    GroupNameChange { name: String },
    GroupMemberAdded { updated_members: Vec<String> },
    GroupMemberRemoved { updated_members: Vec<String> },
    GroupMemberLeft,
}

/// Stored body of a group-update info message (JSON).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpdateMessageData {
    pub kind: Option<UpdateKind>,
}

impl UpdateMessageData {
    pub fn new(kind: UpdateKind) -> Self {
        Self { kind: Some(kind) }
    }

    pub fn to_json(&self) -> Result<String, ExpiryError> {
        serde_json::to_string(self).map_err(Into::into)
    }

    pub fn from_json(json: &str) -> Result<Self, ExpiryError> {
        serde_json::from_str(json).map_err(Into::into)
    }
}

fn join_names<N: SenderNames + ?Sized>(names: &N, members: &[String]) -> String {
    members
        .iter()
        .map(|m| sender_display_name(names, m))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Describe a group update. `local_id` is our own identity, used to detect
/// that we were among the removed members.
pub fn build_group_update_message<N: SenderNames + ?Sized>(
    names: &N,
    local_id: &str,
    data: &UpdateMessageData,
    sender_id: Option<&str>,
    is_outgoing: bool,
) -> String {
    let Some(kind) = &data.kind else {
        return String::new();
    };
    let sender_name = match (is_outgoing, sender_id) {
        (true, _) => YOU.to_string(),
        (false, Some(id)) => sender_display_name(names, id),
        (false, None) => return String::new(),
    };

    match kind {
        UpdateKind::GroupCreation => {
            if is_outgoing {
                "You created a new group".to_string()
            } else {
                format!("{sender_name} added you to the group")
            }
        }
        UpdateKind::GroupNameChange { name } => {
            format!("{sender_name} renamed the group to {name}")
        }
        UpdateKind::GroupMemberAdded { updated_members } => {
            let members = join_names(names, updated_members);
            format!("{sender_name} added {members} to the group")
        }
        UpdateKind::GroupMemberRemoved { updated_members } => {
            if updated_members.iter().any(|m| m == local_id) {
                if is_outgoing {
                    "You left the group".to_string()
                } else {
                    "You were removed from the group".to_string()
                }
            } else {
                let members = join_names(names, updated_members);
                format!("{sender_name} removed {members} from the group")
            }
        }
        UpdateKind::GroupMemberLeft => format!("{sender_name} left the group"),
    }
}

// ── Data extraction & calls ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataExtractionKind {
    Screenshot,
    MediaSaved,
}

pub fn build_data_extraction_message<N: SenderNames + ?Sized>(
    names: &N,
    kind: DataExtractionKind,
    sender_id: &str,
) -> String {
    let name = sender_display_name(names, sender_id);
    match kind {
        DataExtractionKind::Screenshot => format!("{name} took a screenshot"),
        DataExtractionKind::MediaSaved => format!("Media saved by {name}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallMessageType {
    Incoming,
    Outgoing,
    Missed,
    FirstMissed,
}

/// Call notices show the raw id when the contact is unknown.
pub fn build_call_message<N: SenderNames + ?Sized>(
    names: &N,
    kind: CallMessageType,
    sender: &str,
) -> String {
    let name = names
        .display_name(sender)
        .unwrap_or_else(|| sender.to_string());
    match kind {
        CallMessageType::Incoming => format!("{name} called you"),
        CallMessageType::Outgoing => format!("You called {name}"),
        CallMessageType::Missed | CallMessageType::FirstMissed => {
            format!("Missed call from {name}")
        }
    }
}
