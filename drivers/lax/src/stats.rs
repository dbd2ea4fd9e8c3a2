//! Per-unit counters
//!
//! Lock-free, relaxed. Readers get a plain [`StatsSnapshot`].

use core::sync::atomic::{AtomicU64, Ordering};

/// Ordering used for relaxed counters (counters don't need strict ordering)
const RELAXED: Ordering = Ordering::Relaxed;

/// Lock-free unit statistics
#[derive(Debug, Default)]
pub struct UnitStats {
    /// Periodic task firings
    pub ticks: AtomicU64,
    /// Times the periodic task was armed (activation and resumes)
    pub arms: AtomicU64,
    /// Completed reads
    pub reads: AtomicU64,
    /// Completed control writes
    pub writes: AtomicU64,
    /// Requests that failed validation
    pub rejected: AtomicU64,
    /// Stops consumed by the periodic task
    pub stops: AtomicU64,
}

/// Plain copy of [`UnitStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub arms: u64,
    pub reads: u64,
    pub writes: u64,
    pub rejected: u64,
    pub stops: u64,
}

impl UnitStats {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            arms: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            stops: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, RELAXED);
    }

    #[inline]
    pub fn record_arm(&self) {
        self.arms.fetch_add(1, RELAXED);
    }

    #[inline]
    pub fn record_read(&self) {
        self.reads.fetch_add(1, RELAXED);
    }

    #[inline]
    pub fn record_write(&self) {
        self.writes.fetch_add(1, RELAXED);
    }

    #[inline]
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, RELAXED);
    }

    #[inline]
    pub fn record_stop(&self) {
        self.stops.fetch_add(1, RELAXED);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(RELAXED),
            arms: self.arms.load(RELAXED),
            reads: self.reads.load(RELAXED),
            writes: self.writes.load(RELAXED),
            rejected: self.rejected.load(RELAXED),
            stops: self.stops.load(RELAXED),
        }
    }
}
