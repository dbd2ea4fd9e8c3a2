//! # LAX - Load Average Extended driver
//!
//! Kernel-resident load sampler exposed as the pseudo-device `LAX0:`.
//!
//! Once per second the periodic task counts runnable and page-waiting
//! execution units, the lowest priority running on any active CPU, and the
//! total pending I/O on mounted disks, then folds each reading into three
//! exponential moving averages (1, 5 and 15 minutes). Reads return the nine
//! averages as 32-bit fixed-point values with 14 fractional bits; privileged
//! writes stop or resume sampling.
//!
//! ```text
//! TimerQueue ──fires──▶ LaxUnit::run_tick
//!                          │
//!                          ├─▶ collector::collect ──▶ SnapshotProvider (scheduler lock)
//!                          │
//!                          └─▶ store lock ──▶ ControlState / Averages::fold
//!
//! LaxDriver::read  ──▶ store lock ──▶ copy Averages (≤ 36 bytes)
//! LaxDriver::write ──▶ store lock ──▶ ControlState (+ re-arm on resume)
//! ```
//!
//! The host kernel owns the scheduler, the CPU table, the device database and
//! the timer interrupt. They reach this crate through [`SnapshotProvider`] and
//! [`TimerQueue::tick`].

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod collector;
pub mod config;
pub mod driver;
pub mod ema;
pub mod error;
pub mod fixed;
pub mod io;
pub mod sim;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod timer;
pub mod unit;

// Re-exports
pub use collector::{collect, InstantaneousSample};
pub use config::LaxConfig;
pub use driver::{DriverInfo, LaxDriver, DRIVER_INFO};
pub use ema::{DecayCoefficients, Horizon};
pub use error::{LaxError, LaxResult};
pub use fixed::{Fixed32, FX_SCALE, FX_SHIFT};
pub use io::{AccessFault, Credentials, IoBuffer, Privileges, Protection, UserBuffer};
pub use snapshot::{
    CpuPriority, CpuTable, DevChar, DevChar2, DeviceClass, DeviceRecord, PriorityQueues,
    RawCounts, SnapshotProvider, WaitQueue,
};
pub use stats::StatsSnapshot;
pub use store::{Averages, ControlEffect, ControlState, Metric};
pub use timer::{TimerAction, TimerId, TimerQueue, TimerState};
pub use unit::{TaskPhase, TickOutcome, UnitHandle};
