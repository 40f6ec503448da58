/// Expiration coordinator: decides when a disappearing-message countdown
/// starts and hands the decision to storage.
///
/// Pure policy, no I/O of its own. Every failure mode degrades to a logged
/// no-op: a missing timer is re-evaluated on the next sync, a crash in the
/// message pipeline is not recoverable.
use std::sync::Arc;

use crate::clock::NetworkClock;
use crate::error::{ExpiryError, SkipReason};
use crate::timer_update::ExpirationTimerUpdate;
use crate::types::{ExpiryMode, Message};
use crate::update_message::{render_expiration_change_text, SenderNames};

/// What storage did with a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartResult {
    /// First start for this message; countdown committed.
    Started { started_at: u64, expires_at: u64 },
    /// A countdown was already committed; it is left untouched.
    AlreadyRunning { started_at: u64 },
    /// Storage has no such message.
    UnknownMessage,
    /// The message was stored without an expiry; nothing to count down.
    NotExpiring,
}

/// Persists the start of a message's countdown.
///
/// Implementations must be idempotent and must never move a committed
/// `started_at` (compare-and-set on the stored value).
pub trait ExpirationStarter: Send + Sync {
    fn start_any_expiration(
        &self,
        timestamp: u64,
        author: &str,
        expire_started_at: u64,
    ) -> Result<StartResult, ExpiryError>;
}

impl<F> ExpirationStarter for F
where
    F: Fn(u64, &str, u64) -> Result<StartResult, ExpiryError> + Send + Sync,
{
    fn start_any_expiration(
        &self,
        timestamp: u64,
        author: &str,
        expire_started_at: u64,
    ) -> Result<StartResult, ExpiryError> {
        self(timestamp, author, expire_started_at)
    }
}

/// Records timer update control messages (conversation setting + info message).
pub trait TimerMessageSink: Send + Sync {
    fn insert_expiration_timer_message(
        &self,
        update: &ExpirationTimerUpdate,
    ) -> Result<(), ExpiryError>;
}

/// Result of [`start_any_expiration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Nothing to schedule.
    Skipped(SkipReason),
    /// Storage was asked to start at `expire_started_at`.
    Requested {
        expire_started_at: u64,
        result: StartResult,
    },
    /// Storage failed; the error was logged.
    StoreFailed { expire_started_at: u64 },
}

impl StartOutcome {
    /// The start time handed to storage, if any.
    pub fn expire_started_at(&self) -> Option<u64> {
        match self {
            StartOutcome::Skipped(_) => None,
            StartOutcome::Requested {
                expire_started_at, ..
            }
            | StartOutcome::StoreFailed { expire_started_at } => Some(*expire_started_at),
        }
    }
}

/// Countdown start time for `mode`, or `None` when nothing should start.
///
/// After-read (or coerced) countdowns start no earlier than one millisecond
/// after the send, so "started" stays distinguishable from "sent".
pub fn expire_started_at(
    mode: ExpiryMode,
    sent_timestamp: u64,
    coerce_to_disappear_after_read: bool,
    now: u64,
) -> Option<u64> {
    let after_read = matches!(mode, ExpiryMode::AfterRead(_))
        || (coerce_to_disappear_after_read && mode.expiry_millis() > 0);
    if after_read {
        Some(now.max(sent_timestamp.saturating_add(1)))
    } else if let ExpiryMode::AfterSend(_) = mode {
        Some(sent_timestamp)
    } else {
        None
    }
}

/// Start the message's countdown if its mode calls for one.
pub fn start_any_expiration<C, S>(
    message: &Message,
    coerce_to_disappear_after_read: bool,
    clock: &C,
    starter: &S,
) -> StartOutcome
where
    C: NetworkClock + ?Sized,
    S: ExpirationStarter + ?Sized,
{
    tracing::debug!(
        ?message,
        coerce_to_disappear_after_read,
        "start_any_expiration"
    );

    let Some(timestamp) = message.sent_timestamp else {
        return skipped(SkipReason::MissingSendTimestamp);
    };
    let Some(author) = message.sender.as_deref() else {
        return skipped(SkipReason::MissingSender);
    };
    let Some(started_at) = expire_started_at(
        message.expiry_mode,
        timestamp,
        coerce_to_disappear_after_read,
        clock.now_ms(),
    ) else {
        return skipped(SkipReason::ExpiryOff);
    };

    match starter.start_any_expiration(timestamp, author, started_at) {
        Ok(result) => StartOutcome::Requested {
            expire_started_at: started_at,
            result,
        },
        Err(e) => {
            tracing::warn!("expiration start failed for {author}@{timestamp}: {e}");
            StartOutcome::StoreFailed {
                expire_started_at: started_at,
            }
        }
    }
}

fn skipped(reason: SkipReason) -> StartOutcome {
    tracing::debug!("expiration not started: {reason}");
    StartOutcome::Skipped(reason)
}

/// Explicitly constructed expiration context.
///
/// Built once by the application from independent capabilities and passed
/// to every call site that needs it.
#[derive(Clone)]
pub struct ExpirationCoordinator {
    clock: Arc<dyn NetworkClock>,
    starter: Arc<dyn ExpirationStarter>,
    sink: Arc<dyn TimerMessageSink>,
    names: Arc<dyn SenderNames>,
}

impl ExpirationCoordinator {
    pub fn new(
        clock: Arc<dyn NetworkClock>,
        starter: Arc<dyn ExpirationStarter>,
        sink: Arc<dyn TimerMessageSink>,
        names: Arc<dyn SenderNames>,
    ) -> Self {
        Self {
            clock,
            starter,
            sink,
            names,
        }
    }

    pub fn clock(&self) -> &dyn NetworkClock {
        self.clock.as_ref()
    }

    pub fn start_any_expiration(
        &self,
        message: &Message,
        coerce_to_disappear_after_read: bool,
    ) -> StartOutcome {
        start_any_expiration(
            message,
            coerce_to_disappear_after_read,
            self.clock.as_ref(),
            self.starter.as_ref(),
        )
    }

    /// Record a timer update. Returns `false` when it was dropped.
    pub fn insert_expiration_timer_message(&self, update: &ExpirationTimerUpdate) -> bool {
        if update.sender.is_none() {
            tracing::debug!("dropping timer update without sender");
            return false;
        }
        match self.sink.insert_expiration_timer_message(update) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("timer update insert failed: {e}");
                false
            }
        }
    }

    pub fn render_expiration_change_text(
        &self,
        duration: i64,
        is_group: bool,
        sender_id: Option<&str>,
        is_outgoing: bool,
        timestamp: u64,
        expire_started_at: u64,
    ) -> String {
        render_expiration_change_text(
            self.names.as_ref(),
            duration,
            is_group,
            sender_id,
            is_outgoing,
            timestamp,
            expire_started_at,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Mutex;

    /// Records every call, accepts all of them.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(u64, String, u64)>>,
    }

    impl ExpirationStarter for Recorder {
        fn start_any_expiration(
            &self,
            timestamp: u64,
            author: &str,
            expire_started_at: u64,
        ) -> Result<StartResult, ExpiryError> {
            self.calls
                .lock()
                .unwrap()
                .push((timestamp, author.to_string(), expire_started_at));
            Ok(StartResult::Started {
                started_at: expire_started_at,
                expires_at: expire_started_at,
            })
        }
    }

    impl Recorder {
        fn calls(&self) -> Vec<(u64, String, u64)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[test]
    fn off_does_not_persist() {
        let clock = ManualClock::new(5_000);
        let rec = Recorder::default();
        let msg = Message::new(1_000, "alice", ExpiryMode::Off);

        let outcome = start_any_expiration(&msg, false, &clock, &rec);
        assert_eq!(outcome, StartOutcome::Skipped(SkipReason::ExpiryOff));

        let outcome = start_any_expiration(&msg, true, &clock, &rec);
        assert_eq!(outcome, StartOutcome::Skipped(SkipReason::ExpiryOff));
        assert!(rec.calls().is_empty());
    }

    #[test]
    fn missing_fields_skip() {
        let clock = ManualClock::new(5_000);
        let rec = Recorder::default();

        let mut msg = Message::new(1_000, "alice", ExpiryMode::AfterSend(60));
        msg.sent_timestamp = None;
        assert_eq!(
            start_any_expiration(&msg, false, &clock, &rec),
            StartOutcome::Skipped(SkipReason::MissingSendTimestamp)
        );

        let mut msg = Message::new(1_000, "alice", ExpiryMode::AfterSend(60));
        msg.sender = None;
        assert_eq!(
            start_any_expiration(&msg, false, &clock, &rec),
            StartOutcome::Skipped(SkipReason::MissingSender)
        );
        assert!(rec.calls().is_empty());
    }

    #[test]
    fn after_send_starts_at_sent_timestamp() {
        let clock = ManualClock::new(9_999);
        let rec = Recorder::default();
        let msg = Message::new(1_000, "alice", ExpiryMode::AfterSend(60));

        let outcome = start_any_expiration(&msg, false, &clock, &rec);
        assert_eq!(outcome.expire_started_at(), Some(1_000));
        assert_eq!(rec.calls(), vec![(1_000, "alice".to_string(), 1_000)]);
    }

    #[test]
    fn after_read_uses_network_time() {
        let clock = ManualClock::new(5_000);
        let rec = Recorder::default();
        let msg = Message::new(1_000, "alice", ExpiryMode::AfterRead(60));

        let outcome = start_any_expiration(&msg, false, &clock, &rec);
        assert_eq!(outcome.expire_started_at(), Some(5_000));
    }

    #[test]
    fn after_read_never_equals_sent_timestamp() {
        // Clock behind the sender's timestamp.
        let clock = ManualClock::new(500);
        let rec = Recorder::default();
        let msg = Message::new(1_000, "alice", ExpiryMode::AfterRead(60));

        let outcome = start_any_expiration(&msg, false, &clock, &rec);
        assert_eq!(outcome.expire_started_at(), Some(1_001));
    }

    #[test]
    fn coerce_turns_after_send_into_after_read() {
        let clock = ManualClock::new(5_000);
        let rec = Recorder::default();
        let msg = Message::new(1_000, "alice", ExpiryMode::AfterSend(60));

        let outcome = start_any_expiration(&msg, true, &clock, &rec);
        assert_eq!(outcome.expire_started_at(), Some(5_000));
    }

    #[test]
    fn coerce_ignored_for_zero_duration() {
        let msg_mode = ExpiryMode::AfterSend(0);
        assert_eq!(expire_started_at(msg_mode, 1_000, true, 5_000), Some(1_000));
    }

    #[test]
    fn store_failure_is_swallowed() {
        let clock = ManualClock::new(5_000);
        let failing = |_: u64, _: &str, _: u64| -> Result<StartResult, ExpiryError> {
            Err(ExpiryError::Poisoned)
        };
        let msg = Message::new(1_000, "alice", ExpiryMode::AfterSend(60));

        let outcome = start_any_expiration(&msg, false, &clock, &failing);
        assert_eq!(
            outcome,
            StartOutcome::StoreFailed {
                expire_started_at: 1_000
            }
        );
    }

    struct NullSink;

    impl TimerMessageSink for NullSink {
        fn insert_expiration_timer_message(
            &self,
            _update: &ExpirationTimerUpdate,
        ) -> Result<(), ExpiryError> {
            Ok(())
        }
    }

    #[test]
    fn coordinator_wires_capabilities() {
        let rec = Arc::new(Recorder::default());
        let names: Arc<dyn SenderNames> = Arc::new(std::collections::HashMap::from([(
            "abc".to_string(),
            "Alice".to_string(),
        )]));
        let coordinator = ExpirationCoordinator::new(
            Arc::new(ManualClock::new(7_000)),
            rec.clone(),
            Arc::new(NullSink),
            names,
        );

        let msg = Message::new(1_000, "abc", ExpiryMode::AfterRead(3600));
        let outcome = coordinator.start_any_expiration(&msg, false);
        assert_eq!(outcome.expire_started_at(), Some(7_000));
        assert_eq!(rec.calls().len(), 1);

        let text = coordinator.render_expiration_change_text(3600, false, Some("abc"), false, 1_000, 7_000);
        assert_eq!(text, "Alice set messages to disappear 1 hour after read");

        let update = ExpirationTimerUpdate::new(ExpiryMode::Off);
        assert!(!coordinator.insert_expiration_timer_message(&update));
        assert!(coordinator.insert_expiration_timer_message(&update.from_sender("abc")));
    }
}
