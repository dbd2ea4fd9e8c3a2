//! Device unit and periodic task body

use core::sync::atomic::{AtomicBool, Ordering};
use spin::{Mutex, MutexGuard};

use crate::collector;
use crate::snapshot::SnapshotProvider;
use crate::stats::UnitStats;
use crate::store::{Averages, ControlState, UnitState};
use crate::timer::{TimerId, TimerQueue, TimerState};

/// Identifies one unit of the driver
///
/// The generation changes each time a slot is reused, so a handle to a
/// removed unit never reaches its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitHandle {
    index: u32,
    generation: u32,
}

impl UnitHandle {
    pub const fn new(index: u32) -> Self {
        Self::with_generation(index, 0)
    }

    pub(crate) const fn with_generation(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Unit number, as in `LAX0`
    pub const fn index(self) -> u32 {
        self.index
    }

    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// Result of one periodic firing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Averages updated; re-arm
    Updated,
    /// Pending stop consumed; averages zeroed, do not re-arm
    Halted,
}

/// Where the periodic task of a unit stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    /// Waiting for its next firing
    Armed,
    /// Callback running
    Executing,
    /// Not armed
    Dormant,
}

/// One LAX unit
pub struct LaxUnit {
    handle: UnitHandle,
    /// Store lock
    state: Mutex<UnitState>,
    stats: UnitStats,
    /// Set under the store lock once the unit leaves the registry
    retired: AtomicBool,
}

impl LaxUnit {
    pub fn new(handle: UnitHandle) -> Self {
        Self {
            handle,
            state: Mutex::new(UnitState::new()),
            stats: UnitStats::new(),
            retired: AtomicBool::new(false),
        }
    }

    pub fn handle(&self) -> UnitHandle {
        self.handle
    }

    pub fn stats(&self) -> &UnitStats {
        &self.stats
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, UnitState> {
        self.state.lock()
    }

    pub(crate) fn retire(&self, state: &mut UnitState) -> Option<TimerId> {
        self.retired.store(true, Ordering::Release);
        state.task.take()
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Body of the periodic task.
    ///
    /// The sample is taken under the provider's lock, which is released before
    /// the store lock is taken; the two are never held together.
    pub fn run_tick(&self, provider: &dyn SnapshotProvider) -> TickOutcome {
        let sample = collector::collect(provider);
        self.stats.record_tick();

        let running = self.state.lock().apply_tick(&sample);
        if running {
            TickOutcome::Updated
        } else {
            self.stats.record_stop();
            log::info!("LAX{}: sampling stopped, averages cleared", self.handle.index());
            TickOutcome::Halted
        }
    }

    /// Copy the leading bytes of the averages into `dst` under the store lock.
    pub fn read_into(&self, dst: &mut [u8]) -> usize {
        let state = self.state.lock();
        let bytes = state.averages.to_ne_bytes();
        let len = dst.len().min(Averages::BYTES);
        dst[..len].copy_from_slice(&bytes[..len]);
        len
    }

    pub fn averages(&self) -> Averages {
        self.state.lock().averages
    }

    pub fn control_state(&self) -> ControlState {
        self.state.lock().control
    }

    pub fn task(&self) -> Option<TimerId> {
        self.state.lock().task
    }

    pub fn task_phase(&self, timers: &TimerQueue) -> TaskPhase {
        let Some(id) = self.task() else {
            return TaskPhase::Dormant;
        };
        match timers.state(id) {
            Some(TimerState::Pending) => TaskPhase::Armed,
            Some(TimerState::Firing) => TaskPhase::Executing,
            _ => TaskPhase::Dormant,
        }
    }
}
