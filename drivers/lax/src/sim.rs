//! Simulated host system
//!
//! A [`SnapshotProvider`] whose scheduler queues, CPU table and device
//! database are plain fields behind a `spin::Mutex`. Tests and bring-up code
//! drive the driver through it without a real kernel.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

use crate::snapshot::{
    CpuPriority, CpuTable, DeviceRecord, PriorityQueues, RawCounts, SnapshotProvider, WaitQueue,
};

struct SimState {
    computable: PriorityQueues,
    outswapped: PriorityQueues,
    wait_queues: [u32; WaitQueue::COUNT],
    active_cpus: Vec<u64>,
    cpus: Vec<CpuPriority>,
    devices: Vec<DeviceRecord>,
}

impl SimState {
    const fn new() -> Self {
        Self {
            computable: PriorityQueues::EMPTY,
            outswapped: PriorityQueues::EMPTY,
            wait_queues: [0; WaitQueue::COUNT],
            active_cpus: Vec::new(),
            cpus: Vec::new(),
            devices: Vec::new(),
        }
    }

    fn ensure_cpu(&mut self, cpu_id: u32) {
        let id = cpu_id as usize;
        if self.cpus.len() <= id {
            self.cpus.resize(id + 1, CpuPriority::Idle);
        }
        let words = id / u64::BITS as usize + 1;
        if self.active_cpus.len() < words {
            self.active_cpus.resize(words, 0);
        }
    }
}

fn set_depth(queues: &mut PriorityQueues, priority: usize, depth: u32) -> bool {
    let Some(slot) = queues.depth.get_mut(priority) else {
        return false;
    };
    *slot = depth;
    if depth != 0 {
        queues.active |= 1u64 << priority;
    } else {
        queues.active &= !(1u64 << priority);
    }
    true
}

/// In-memory scheduler, CPU table and device database
pub struct SimulatedSystem {
    state: Mutex<SimState>,
    scans: AtomicU64,
}

impl SimulatedSystem {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(SimState::new()),
            scans: AtomicU64::new(0),
        }
    }

    /// Set the depth of one computable queue. Returns `false` for a priority
    /// outside `0..PRIORITY_LEVELS`.
    pub fn set_computable(&self, priority: usize, depth: u32) -> bool {
        set_depth(&mut self.state.lock().computable, priority, depth)
    }

    /// Same as [`Self::set_computable`] for the outswapped queues.
    pub fn set_outswapped(&self, priority: usize, depth: u32) -> bool {
        set_depth(&mut self.state.lock().outswapped, priority, depth)
    }

    /// Replace a queue family wholesale, active mask included.
    pub fn set_computable_queues(&self, queues: PriorityQueues) {
        self.state.lock().computable = queues;
    }

    pub fn set_wait_queue(&self, queue: WaitQueue, count: u32) {
        self.state.lock().wait_queues[queue as usize] = count;
    }

    /// Set what a CPU runs, adding it (inactive) if unknown.
    pub fn set_cpu(&self, cpu_id: u32, current: CpuPriority) {
        let mut state = self.state.lock();
        state.ensure_cpu(cpu_id);
        state.cpus[cpu_id as usize] = current;
    }

    /// Add or remove a CPU from the active set.
    pub fn set_cpu_active(&self, cpu_id: u32, active: bool) {
        let mut state = self.state.lock();
        state.ensure_cpu(cpu_id);
        let word = (cpu_id / u64::BITS) as usize;
        let bit = 1u64 << (cpu_id % u64::BITS);
        if active {
            state.active_cpus[word] |= bit;
        } else {
            state.active_cpus[word] &= !bit;
        }
    }

    /// Append a device record and return its index.
    pub fn add_device(&self, record: DeviceRecord) -> usize {
        let mut state = self.state.lock();
        state.devices.push(record);
        state.devices.len() - 1
    }

    /// Update a device's pending request count. Returns `false` for an unknown index.
    pub fn set_queue_len(&self, index: usize, queue_len: i32) -> bool {
        match self.state.lock().devices.get_mut(index) {
            Some(dev) => {
                dev.queue_len = queue_len;
                true
            }
            None => false,
        }
    }

    /// Number of completed provider calls
    pub fn scans(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }
}

impl Default for SimulatedSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotProvider for SimulatedSystem {
    fn collect_raw_counts(&self, scan: &mut dyn FnMut(&RawCounts<'_>)) {
        {
            let state = self.state.lock();
            let raw = RawCounts {
                computable: state.computable,
                outswapped: state.outswapped,
                wait_queues: state.wait_queues,
                cpus: CpuTable {
                    active: &state.active_cpus,
                    max_cpu_id: state.cpus.len().saturating_sub(1) as u32,
                    current: &state.cpus,
                },
                devices: &state.devices,
            };
            scan(&raw);
        }
        self.scans.fetch_add(1, Ordering::Relaxed);
    }
}
