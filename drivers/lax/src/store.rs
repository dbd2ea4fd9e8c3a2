//! Averages store and start/stop control state
//!
//! Both live in [`UnitState`], behind the unit's store lock. The periodic task,
//! readers and writers each hold that lock for exactly one update, copy or
//! transition, so a reader always sees all nine values from the same tick.

use crate::collector::InstantaneousSample;
use crate::ema::{self, Horizon};
use crate::fixed::Fixed32;
use crate::timer::TimerId;

/// Number of published averages (3 metrics x 3 horizons)
pub const SLOTS: usize = 9;

/// Which reading an average tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Runnable and page-waiting execution units
    RunQueue = 0,
    /// Lowest priority among busy CPUs
    LowestPriority = 1,
    /// Pending requests on mounted disks
    DiskQueue = 2,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::RunQueue, Metric::LowestPriority, Metric::DiskQueue];

    fn sample_of(self, sample: &InstantaneousSample) -> Fixed32 {
        match self {
            Metric::RunQueue => sample.run_queue,
            Metric::LowestPriority => sample.lowest_priority,
            Metric::DiskQueue => sample.disk_queue,
        }
    }
}

/// The nine averages, in device order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct Averages([Fixed32; SLOTS]);

impl Averages {
    /// Size of the device buffer
    pub const BYTES: usize = SLOTS * core::mem::size_of::<u32>();

    pub const ZERO: Self = Self([Fixed32::ZERO; SLOTS]);

    /// Device index of one average: `metric * 3 + horizon`.
    pub const fn slot(metric: Metric, horizon: Horizon) -> usize {
        metric as usize * Horizon::ALL.len() + horizon as usize
    }

    pub fn get(&self, metric: Metric, horizon: Horizon) -> Fixed32 {
        self.0[Self::slot(metric, horizon)]
    }

    pub fn as_array(&self) -> &[Fixed32; SLOTS] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| v.is_zero())
    }

    pub fn clear(&mut self) {
        self.0 = [Fixed32::ZERO; SLOTS];
    }

    /// Fold one tick's readings into all nine averages.
    pub fn fold(&mut self, sample: &InstantaneousSample) {
        for metric in Metric::ALL {
            let value = metric.sample_of(sample);
            for horizon in Horizon::ALL {
                let slot = &mut self.0[Self::slot(metric, horizon)];
                *slot = ema::update(*slot, value, horizon.coefficients());
            }
        }
    }

    /// Host-endian device image.
    pub fn to_ne_bytes(&self) -> [u8; Self::BYTES] {
        let mut bytes = [0u8; Self::BYTES];
        for (chunk, value) in bytes.chunks_exact_mut(4).zip(self.0.iter()) {
            chunk.copy_from_slice(&value.to_ne_bytes());
        }
        bytes
    }
}

impl From<[u32; SLOTS]> for Averages {
    fn from(bits: [u32; SLOTS]) -> Self {
        Self(bits.map(Fixed32::from_bits))
    }
}

/// Sampling control state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlState {
    /// Periodic task armed and updating
    #[default]
    Running,
    /// Next tick zeroes the averages and goes dormant
    StopRequested,
    /// Periodic task not armed
    Stopped,
}

/// What a control request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEffect {
    /// Running → StopRequested
    StopRequested,
    /// A stop was already pending
    StopAlreadyPending,
    /// Stop requested while already stopped
    AlreadyStopped,
    /// Stopped → Running; the caller must re-arm the periodic task
    Resumed,
    /// Resume requested while not stopped
    AlreadyRunning,
}

impl ControlEffect {
    pub fn needs_rearm(self) -> bool {
        self == ControlEffect::Resumed
    }
}

impl ControlState {
    pub fn request_stop(&mut self) -> ControlEffect {
        match *self {
            ControlState::Running => {
                *self = ControlState::StopRequested;
                ControlEffect::StopRequested
            }
            ControlState::StopRequested => ControlEffect::StopAlreadyPending,
            ControlState::Stopped => ControlEffect::AlreadyStopped,
        }
    }

    /// A pending stop is not cancelled by a resume: the tick still consumes it.
    pub fn request_resume(&mut self) -> ControlEffect {
        match *self {
            ControlState::Stopped => {
                *self = ControlState::Running;
                ControlEffect::Resumed
            }
            ControlState::Running | ControlState::StopRequested => ControlEffect::AlreadyRunning,
        }
    }

    /// Tick side: consume a pending stop.
    pub fn take_stop(&mut self) -> bool {
        if *self == ControlState::StopRequested {
            *self = ControlState::Stopped;
            true
        } else {
            false
        }
    }
}

/// Everything guarded by the store lock
#[derive(Debug, Default)]
pub struct UnitState {
    pub averages: Averages,
    pub control: ControlState,
    /// Timer of the current periodic sequence, `None` while dormant
    pub task: Option<TimerId>,
}

impl UnitState {
    /// Fresh unit: zeroed averages, running, not yet armed.
    pub const fn new() -> Self {
        Self {
            averages: Averages::ZERO,
            control: ControlState::Running,
            task: None,
        }
    }

    /// One tick under the store lock. Returns `false` once the task must halt.
    pub fn apply_tick(&mut self, sample: &InstantaneousSample) -> bool {
        if self.control.take_stop() {
            self.averages.clear();
            self.task = None;
            return false;
        }
        self.averages.fold(sample);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::const_assert_eq;

    const_assert_eq!(core::mem::size_of::<Averages>(), 36);
    const_assert_eq!(Averages::BYTES, 36);

    fn sample(run: u32, pri: u32, disk: u32) -> InstantaneousSample {
        InstantaneousSample {
            run_queue: Fixed32::from_count(run),
            lowest_priority: Fixed32::from_count(pri),
            disk_queue: Fixed32::from_count(disk),
        }
    }

    #[test]
    fn test_slot_layout() {
        assert_eq!(Averages::slot(Metric::RunQueue, Horizon::OneMinute), 0);
        assert_eq!(Averages::slot(Metric::RunQueue, Horizon::FifteenMinutes), 2);
        assert_eq!(Averages::slot(Metric::LowestPriority, Horizon::OneMinute), 3);
        assert_eq!(Averages::slot(Metric::DiskQueue, Horizon::FiveMinutes), 7);
        assert_eq!(Averages::slot(Metric::DiskQueue, Horizon::FifteenMinutes), 8);
    }

    #[test]
    fn test_fold_routes_metrics() {
        let mut avgs = Averages::ZERO;
        avgs.fold(&sample(4, 0, 0));
        let run: std::vec::Vec<u32> = avgs.as_array()[..3].iter().map(|v| v.to_bits()).collect();
        assert_eq!(run, [1083, 218, 72]);
        assert!(avgs.as_array()[3..].iter().all(|v| v.is_zero()));

        let mut avgs = Averages::ZERO;
        avgs.fold(&sample(0, 0, 4));
        assert_eq!(avgs.get(Metric::DiskQueue, Horizon::OneMinute).to_bits(), 1083);
        assert!(avgs.get(Metric::RunQueue, Horizon::OneMinute).is_zero());
    }

    #[test]
    fn test_byte_image_is_host_endian() {
        let avgs = Averages::from([1, 2, 3, 4, 5, 6, 7, 8, 0xdead_beef]);
        let bytes = avgs.to_ne_bytes();
        assert_eq!(bytes.len(), 36);
        assert_eq!(&bytes[0..4], &1u32.to_ne_bytes());
        assert_eq!(&bytes[32..36], &0xdead_beefu32.to_ne_bytes());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut state = ControlState::Running;
        assert_eq!(state.request_stop(), ControlEffect::StopRequested);
        assert_eq!(state.request_stop(), ControlEffect::StopAlreadyPending);
        assert_eq!(state, ControlState::StopRequested);
        assert!(state.take_stop());
        assert!(!state.take_stop());
        assert_eq!(state, ControlState::Stopped);
        assert_eq!(state.request_stop(), ControlEffect::AlreadyStopped);
        assert_eq!(state, ControlState::Stopped);
    }

    #[test]
    fn test_resume_only_from_stopped() {
        let mut state = ControlState::Running;
        assert_eq!(state.request_resume(), ControlEffect::AlreadyRunning);
        assert_eq!(state, ControlState::Running);

        state.request_stop();
        assert_eq!(state.request_resume(), ControlEffect::AlreadyRunning);
        assert_eq!(state, ControlState::StopRequested);

        state.take_stop();
        let effect = state.request_resume();
        assert!(effect.needs_rearm());
        assert_eq!(state, ControlState::Running);
        assert_eq!(state.request_resume(), ControlEffect::AlreadyRunning);
    }

    #[test]
    fn test_tick_consumes_stop_and_zeroes() {
        let mut unit = UnitState::new();
        unit.task = Some(TimerId(7));
        assert!(unit.apply_tick(&sample(3, 2, 1)));
        assert!(!unit.averages.is_zero());

        unit.control.request_stop();
        unit.control.request_stop();
        assert!(!unit.apply_tick(&sample(3, 2, 1)));
        assert!(unit.averages.is_zero());
        assert_eq!(unit.control, ControlState::Stopped);
        assert_eq!(unit.task, None);
    }
}
