/// Network-adjusted clocks.
///
/// Expiration logic never reads the system clock directly. It asks an
/// injected [`NetworkClock`], so tests can pin time and production can apply
/// the offset learned from the storage network.
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::types::now_ms;

/// Source of "now" in Unix milliseconds.
///
/// Implementations should not go backwards within a process.
pub trait NetworkClock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Plain system time, no adjustment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl NetworkClock for SystemClock {
    fn now_ms(&self) -> u64 {
        now_ms()
    }
}

/// System time plus a signed offset reported by the network.
#[derive(Debug, Default)]
pub struct OffsetClock {
    offset_ms: AtomicI64,
}

impl OffsetClock {
    pub fn new(offset_ms: i64) -> Self {
        Self {
            offset_ms: AtomicI64::new(offset_ms),
        }
    }

    /// Replace the offset (e.g. after a fresh round-trip to a storage node).
    pub fn set_offset(&self, offset_ms: i64) {
        self.offset_ms.store(offset_ms, Ordering::Relaxed);
    }

    pub fn offset(&self) -> i64 {
        self.offset_ms.load(Ordering::Relaxed)
    }

    fn apply(base: u64, offset: i64) -> u64 {
        if offset >= 0 {
            base.saturating_add(offset as u64)
        } else {
            base.saturating_sub(offset.unsigned_abs())
        }
    }
}

impl NetworkClock for OffsetClock {
    fn now_ms(&self) -> u64 {
        Self::apply(now_ms(), self.offset())
    }
}

/// Hand-driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::Relaxed);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::Relaxed);
    }
}

impl NetworkClock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}

impl<C: NetworkClock + ?Sized> NetworkClock for std::sync::Arc<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}
