//! Sample collector
//!
//! Reduces one [`RawCounts`] view to the three instantaneous readings the
//! averages are built from:
//!
//! - run queue: every active computable and outswapped queue, the three page
//!   wait queues, plus one for each active CPU that is not idle
//! - lowest priority: minimum current priority over those busy CPUs, 0 when
//!   every active CPU is idle
//! - disk queue: pending requests on mounted disks, excluding class driver
//!   ports and shadow set members

use crate::fixed::Fixed32;
use crate::snapshot::{RawCounts, SnapshotProvider, WaitQueue};

/// Unscaled totals of one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawTotals {
    pub run_queue: u32,
    /// `None` when no active CPU is running anything
    pub lowest_priority: Option<u32>,
    pub disk_queue: u32,
}

/// The three readings of one tick, already scaled to fixed-point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstantaneousSample {
    pub run_queue: Fixed32,
    pub lowest_priority: Fixed32,
    pub disk_queue: Fixed32,
}

impl InstantaneousSample {
    pub const ZERO: Self = Self {
        run_queue: Fixed32::ZERO,
        lowest_priority: Fixed32::ZERO,
        disk_queue: Fixed32::ZERO,
    };
}

impl From<RawTotals> for InstantaneousSample {
    fn from(totals: RawTotals) -> Self {
        Self {
            run_queue: Fixed32::from_count(totals.run_queue),
            lowest_priority: Fixed32::from_count(totals.lowest_priority.unwrap_or(0)),
            disk_queue: Fixed32::from_count(totals.disk_queue),
        }
    }
}

/// Count everything in one view. Bounded by the queue, CPU and device counts.
pub fn tally(raw: &RawCounts<'_>) -> RawTotals {
    let mut run_queue = raw
        .computable
        .runnable()
        .saturating_add(raw.outswapped.runnable());

    for queue in WaitQueue::ALL {
        run_queue = run_queue.saturating_add(raw.wait_queue(queue));
    }

    let mut lowest_priority: Option<u32> = None;
    for pri in raw.cpus.running() {
        run_queue = run_queue.saturating_add(1);
        lowest_priority = Some(lowest_priority.map_or(pri, |low| low.min(pri)));
    }

    let disk_queue = raw
        .devices
        .iter()
        .fold(0u32, |total, dev| total.saturating_add(dev.disk_queue_contribution()));

    RawTotals {
        run_queue,
        lowest_priority,
        disk_queue,
    }
}

/// Take one sample through the provider's scheduler lock.
pub fn collect(provider: &dyn SnapshotProvider) -> InstantaneousSample {
    let mut totals = RawTotals::default();
    provider.collect_raw_counts(&mut |raw: &RawCounts<'_>| totals = tally(raw));
    log::trace!(
        "lax sample: runq={} lowpri={:?} diskq={}",
        totals.run_queue,
        totals.lowest_priority,
        totals.disk_queue
    );
    InstantaneousSample::from(totals)
}
