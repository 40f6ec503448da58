//! ToM disappearing messages.
//!
//! Decides when a message's expiration countdown starts, persists that
//! decision through an injected store, deletes messages once their deadline
//! passes, and renders the text shown when a conversation's setting changes.
//!
//! Wire format: MessagePack for timer update control messages.
//! Persistence: SQLite, or a bounded in-memory store.

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod display;
pub mod error;
pub mod store;
pub mod sweeper;
pub mod timer_update;
pub mod types;
pub mod update_message;

pub use clock::{ManualClock, NetworkClock, OffsetClock, SystemClock};
pub use config::ExpiryConfig;
pub use coordinator::{
    expire_started_at, start_any_expiration, ExpirationCoordinator, ExpirationStarter,
    StartOutcome, StartResult, TimerMessageSink,
};
pub use display::{
    expiration_abbreviated_display_value, expiration_display_value,
    expiration_display_value_for, expiration_type_display_value,
};
pub use error::{ExpiryError, SkipReason};
pub use store::{ExpiryStore, ExpirySweep, MemoryExpirationStore, SqliteExpirationStore};
pub use sweeper::{spawn_sweeper, SweeperHandle};
pub use timer_update::ExpirationTimerUpdate;
pub use types::{now_ms, ExpirationTimerState, ExpiryMode, Message, MessageKey};
pub use update_message::{
    build_call_message, build_data_extraction_message, build_group_update_message,
    render_expiration_change_text, sender_display_name, truncate_id_for_display,
    CallMessageType, DataExtractionKind, SenderNames, UpdateKind, UpdateMessageData,
};
