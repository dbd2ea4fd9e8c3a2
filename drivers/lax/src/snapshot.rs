//! Read-only view of the host scheduler, CPU table and device database
//!
//! The driver never walks kernel structures itself. The host implements
//! [`SnapshotProvider`]: it takes its scheduler lock, lays out the current
//! queue depths, CPU priorities and disk units as a [`RawCounts`], and hands
//! that view to the collector for the duration of one call.

use bitflags::bitflags;

/// Number of scheduling priorities (one computable queue each)
pub const PRIORITY_LEVELS: usize = 64;

/// Injected source of the raw per-tick counts.
pub trait SnapshotProvider: Send + Sync {
    /// Present a consistent view of the scheduler state to `scan`.
    ///
    /// Implementations hold their scheduler lock for the whole call and
    /// release it before returning. `scan` is bounded and never blocks.
    fn collect_raw_counts(&self, scan: &mut dyn FnMut(&RawCounts<'_>));
}

/// Depths of one family of priority-indexed run queues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityQueues {
    /// Bit `i` set when `depth[i]` is worth visiting
    pub active: u64,
    pub depth: [u32; PRIORITY_LEVELS],
}

impl PriorityQueues {
    pub const EMPTY: Self = Self {
        active: 0,
        depth: [0; PRIORITY_LEVELS],
    };

    /// Build from depths alone, deriving the active mask from nonzero queues.
    pub fn from_depths(depth: [u32; PRIORITY_LEVELS]) -> Self {
        let active = depth
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d != 0)
            .fold(0u64, |mask, (i, _)| mask | (1u64 << i));
        Self { active, depth }
    }

    /// Sum of the depths of every active queue.
    pub fn runnable(&self) -> u32 {
        let mut total = 0u32;
        let mut mask = self.active;
        while mask != 0 {
            let idx = mask.trailing_zeros() as usize;
            total = total.saturating_add(self.depth[idx]);
            mask &= mask - 1;
        }
        total
    }
}

impl Default for PriorityQueues {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Page-related wait states counted as load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitQueue {
    /// Collided page wait
    CollidedPage = 0,
    /// Page fault wait
    PageFault = 1,
    /// Free page wait
    FreePage = 2,
}

impl WaitQueue {
    pub const COUNT: usize = 3;
    pub const ALL: [WaitQueue; Self::COUNT] =
        [WaitQueue::CollidedPage, WaitQueue::PageFault, WaitQueue::FreePage];
}

/// What a CPU is currently running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CpuPriority {
    #[default]
    Idle,
    /// Current priority of the thread on this CPU
    Running(u32),
}

/// Per-CPU state, indexed by CPU id
#[derive(Debug, Clone, Copy)]
pub struct CpuTable<'a> {
    /// Active set, one bit per CPU id, 64 ids per word
    pub active: &'a [u64],
    /// Highest CPU id the bitmap may name
    pub max_cpu_id: u32,
    pub current: &'a [CpuPriority],
}

impl CpuTable<'static> {
    pub const EMPTY: Self = Self {
        active: &[],
        max_cpu_id: 0,
        current: &[],
    };
}

impl CpuTable<'_> {
    pub fn is_active(&self, cpu_id: u32) -> bool {
        let word = (cpu_id / u64::BITS) as usize;
        let bit = cpu_id % u64::BITS;
        self.active
            .get(word)
            .map_or(false, |w| w & (1 << bit) != 0)
    }

    /// Priorities of active CPUs that are not idle.
    pub fn running(&self) -> impl Iterator<Item = u32> + '_ {
        (0..=self.max_cpu_id)
            .filter(move |&id| self.is_active(id))
            .filter_map(move |id| match self.current.get(id as usize) {
                Some(CpuPriority::Running(pri)) => Some(*pri),
                _ => None,
            })
    }
}

/// Device class as recorded in the unit control block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    Disk,
    Tape,
    Scom,
    Card,
    Terminal,
    LinePrinter,
    Realtime,
    Bus,
    Mailbox,
    Journal,
    Misc,
}

bitflags! {
    /// Primary device characteristics
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DevChar: u32 {
        /// Record oriented
        const REC = 1 << 0;
        /// Carriage control
        const CCL = 1 << 1;
        /// Terminal
        const TRM = 1 << 2;
        /// Directory structured
        const DIR = 1 << 3;
        /// Single directory
        const SDI = 1 << 4;
        /// Sequential block-oriented
        const SQD = 1 << 5;
        /// Spooled
        const SPL = 1 << 6;
        /// Operator
        const OPR = 1 << 7;
        /// Network
        const NET = 1 << 13;
        /// Shareable
        const SHR = 1 << 16;
        /// Generic
        const GEN = 1 << 17;
        /// Available
        const AVL = 1 << 18;
        /// Mounted
        const MNT = 1 << 19;
        /// Mailbox
        const MBX = 1 << 20;
        /// Input device
        const IDV = 1 << 26;
        /// Output device
        const ODV = 1 << 27;
        /// Random access
        const RND = 1 << 28;
    }
}

bitflags! {
    /// Secondary device characteristics
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DevChar2: u32 {
        /// Class driver port
        const CDP = 1 << 2;
        /// Prefix the device name with the node name
        const NNM = 1 << 9;
        /// Shadow set member
        const SSM = 1 << 10;
        /// Served device
        const SRV = 1 << 11;
    }
}

/// One unit from the device database scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRecord {
    pub unit: u32,
    pub class: DeviceClass,
    pub characteristics: DevChar,
    pub characteristics2: DevChar2,
    /// Pending request count; the database may report negative values
    pub queue_len: i32,
}

impl DeviceRecord {
    /// Mounted disk that is neither a class driver port nor a shadow member.
    pub fn counts_toward_disk_queue(&self) -> bool {
        self.class == DeviceClass::Disk
            && self.characteristics.contains(DevChar::MNT)
            && !self
                .characteristics2
                .intersects(DevChar2::CDP | DevChar2::SSM)
    }

    /// Pending requests this unit contributes to the disk queue total.
    pub fn disk_queue_contribution(&self) -> u32 {
        if self.counts_toward_disk_queue() && self.queue_len > 0 {
            self.queue_len as u32
        } else {
            0
        }
    }
}

/// Everything the collector reads in one tick
#[derive(Debug, Clone, Copy)]
pub struct RawCounts<'a> {
    /// Computable queues
    pub computable: PriorityQueues,
    /// Computable outswapped queues
    pub outswapped: PriorityQueues,
    /// Indexed by [`WaitQueue`]
    pub wait_queues: [u32; WaitQueue::COUNT],
    pub cpus: CpuTable<'a>,
    pub devices: &'a [DeviceRecord],
}

impl RawCounts<'static> {
    pub const EMPTY: Self = Self {
        computable: PriorityQueues::EMPTY,
        outswapped: PriorityQueues::EMPTY,
        wait_queues: [0; WaitQueue::COUNT],
        cpus: CpuTable::EMPTY,
        devices: &[],
    };
}

impl RawCounts<'_> {
    pub fn wait_queue(&self, queue: WaitQueue) -> u32 {
        self.wait_queues[queue as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk(characteristics: DevChar, characteristics2: DevChar2, queue_len: i32) -> DeviceRecord {
        DeviceRecord {
            unit: 0,
            class: DeviceClass::Disk,
            characteristics,
            characteristics2,
            queue_len,
        }
    }

    #[test]
    fn test_inactive_queue_bits_are_skipped() {
        let mut depth = [0u32; PRIORITY_LEVELS];
        depth[3] = 5;
        depth[10] = 7;
        let queues = PriorityQueues { active: 1 << 3, depth };
        assert_eq!(queues.runnable(), 5);
    }

    #[test]
    fn test_from_depths_derives_mask() {
        let mut depth = [0u32; PRIORITY_LEVELS];
        depth[0] = 1;
        depth[63] = 2;
        let queues = PriorityQueues::from_depths(depth);
        assert_eq!(queues.active, 1 | (1 << 63));
        assert_eq!(queues.runnable(), 3);
    }

    #[test]
    fn test_full_scan_mask() {
        let queues = PriorityQueues {
            active: u64::MAX,
            depth: [1; PRIORITY_LEVELS],
        };
        assert_eq!(queues.runnable(), PRIORITY_LEVELS as u32);
    }

    #[test]
    fn test_cpu_active_beyond_first_word() {
        let active = [0b1, 0b10];
        let current = [CpuPriority::Idle; 66];
        let table = CpuTable {
            active: &active,
            max_cpu_id: 65,
            current: &current,
        };
        assert!(table.is_active(0));
        assert!(!table.is_active(1));
        assert!(table.is_active(65));
        assert!(!table.is_active(200));
    }

    #[test]
    fn test_running_skips_idle_and_inactive() {
        // CPU 1 busy but inactive, CPU 2 active but idle
        let active = [0b1101];
        let current = [
            CpuPriority::Running(4),
            CpuPriority::Running(1),
            CpuPriority::Idle,
            CpuPriority::Running(9),
        ];
        let table = CpuTable {
            active: &active,
            max_cpu_id: 3,
            current: &current,
        };
        let mut running: std::vec::Vec<u32> = table.running().collect();
        running.sort_unstable();
        assert_eq!(running, [4, 9]);
    }

    #[test]
    fn test_disk_exclusion_rules() {
        assert!(disk(DevChar::MNT, DevChar2::empty(), 3).counts_toward_disk_queue());
        assert!(!disk(DevChar::empty(), DevChar2::empty(), 3).counts_toward_disk_queue());
        assert_eq!(disk(DevChar::MNT, DevChar2::SSM, 3).disk_queue_contribution(), 0);
        assert_eq!(disk(DevChar::MNT, DevChar2::CDP, 3).disk_queue_contribution(), 0);
        assert_eq!(disk(DevChar::MNT, DevChar2::empty(), -4).disk_queue_contribution(), 0);
        assert_eq!(disk(DevChar::MNT, DevChar2::NNM, 6).disk_queue_contribution(), 6);

        let tape = DeviceRecord {
            class: DeviceClass::Tape,
            ..disk(DevChar::MNT, DevChar2::empty(), 2)
        };
        assert_eq!(tape.disk_queue_contribution(), 0);
    }
}
