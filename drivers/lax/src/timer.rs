//! Software timer queue
//!
//! One-shot timers with callbacks. A callback decides on return whether its
//! timer re-arms, which is how the sampling task waits one second between
//! ticks without holding a thread. The host calls [`TimerQueue::tick`] from its
//! timer interrupt (or a test advances it by hand).

use alloc::boxed::Box;
use alloc::vec::Vec;
use spin::Mutex;

/// Timer ID (unique identifier)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// What a timer does after its callback returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Fire again `delay_ns` after this firing
    Rearm(u64),
    /// Done; the timer completes
    Finish,
}

/// Timer callback function
pub type TimerCallback = Box<dyn FnMut() -> TimerAction + Send>;

/// Timer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Timer is pending (waiting to fire)
    Pending,
    /// Timer has fired and its callback is running
    Firing,
    /// Timer is cancelled
    Cancelled,
    /// Timer is completed
    Completed,
}

/// Timer structure
struct TimerEntry {
    id: TimerId,
    state: TimerState,
    deadline_ns: u64,
    callback: Option<TimerCallback>,
}

impl TimerEntry {
    fn is_ready(&self, now_ns: u64) -> bool {
        self.state == TimerState::Pending && now_ns >= self.deadline_ns
    }

    fn is_done(&self) -> bool {
        matches!(self.state, TimerState::Completed | TimerState::Cancelled)
    }
}

/// Timer manager
struct TimerManager {
    timers: Vec<TimerEntry>,
    next_id: u64,
    now_ns: u64,
}

impl TimerManager {
    const fn new() -> Self {
        Self {
            timers: Vec::new(),
            next_id: 1,
            now_ns: 0,
        }
    }

    fn alloc_id(&mut self) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        id
    }

    fn add_timer(&mut self, delay_ns: u64, callback: TimerCallback) -> TimerId {
        let id = self.alloc_id();
        self.timers.push(TimerEntry {
            id,
            state: TimerState::Pending,
            deadline_ns: self.now_ns.saturating_add(delay_ns),
            callback: Some(callback),
        });
        id
    }

    fn find_mut(&mut self, id: TimerId) -> Option<&mut TimerEntry> {
        self.timers.iter_mut().find(|t| t.id == id)
    }

    fn cancel_timer(&mut self, id: TimerId) -> bool {
        match self.find_mut(id) {
            Some(timer) if !timer.is_done() => {
                timer.state = TimerState::Cancelled;
                // A firing timer keeps its entry until the callback returns
                timer.callback = None;
                true
            }
            _ => false,
        }
    }

    /// Mark due timers as firing and hand out their callbacks.
    fn take_ready(&mut self, now_ns: u64) -> Vec<(TimerId, TimerCallback)> {
        let mut ready = Vec::new();
        for timer in self.timers.iter_mut().filter(|t| t.is_ready(now_ns)) {
            if let Some(callback) = timer.callback.take() {
                timer.state = TimerState::Firing;
                ready.push((timer.id, callback));
            }
        }
        ready
    }

    fn finish(&mut self, id: TimerId, action: TimerAction, callback: TimerCallback) {
        let now_ns = self.now_ns;
        if let Some(timer) = self.find_mut(id) {
            if timer.state != TimerState::Firing {
                // Cancelled while firing
                return;
            }
            match action {
                TimerAction::Rearm(delay_ns) => {
                    timer.deadline_ns = now_ns.saturating_add(delay_ns);
                    timer.state = TimerState::Pending;
                    timer.callback = Some(callback);
                }
                TimerAction::Finish => timer.state = TimerState::Completed,
            }
        }
    }

    fn reap(&mut self) {
        self.timers.retain(|t| !t.is_done());
    }
}

/// Timer queue shared by the driver and the host's clock interrupt
pub struct TimerQueue {
    manager: Mutex<TimerManager>,
}

impl TimerQueue {
    pub const fn new() -> Self {
        Self {
            manager: Mutex::new(TimerManager::new()),
        }
    }

    /// Create a one-shot timer firing `delay_ns` after the queue's current time
    pub fn set_timer_once<F>(&self, delay_ns: u64, callback: F) -> TimerId
    where
        F: FnMut() -> TimerAction + Send + 'static,
    {
        self.manager.lock().add_timer(delay_ns, Box::new(callback))
    }

    /// Cancel a timer. Returns `false` if it already completed or never existed.
    pub fn cancel_timer(&self, id: TimerId) -> bool {
        self.manager.lock().cancel_timer(id)
    }

    /// Current state, `None` once a finished timer has been reaped
    pub fn state(&self, id: TimerId) -> Option<TimerState> {
        self.manager
            .lock()
            .timers
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.state)
    }

    /// Time of the most recent tick
    pub fn now_ns(&self) -> u64 {
        self.manager.lock().now_ns
    }

    /// Timers still waiting to fire
    pub fn pending(&self) -> usize {
        self.manager
            .lock()
            .timers
            .iter()
            .filter(|t| t.state == TimerState::Pending)
            .count()
    }

    /// Process timers (called from the clock interrupt).
    ///
    /// Every due timer fires once, even if `now_ns` is far past its deadline;
    /// a re-armed timer counts its delay from `now_ns`. Callbacks run without
    /// the queue lock held, so they may arm or cancel timers themselves.
    /// Returns the number of callbacks run.
    pub fn tick(&self, now_ns: u64) -> usize {
        let ready = {
            let mut manager = self.manager.lock();
            if now_ns > manager.now_ns {
                manager.now_ns = now_ns;
            }
            let now_ns = manager.now_ns;
            manager.take_ready(now_ns)
        };

        let fired = ready.len();
        for (id, mut callback) in ready {
            let action = callback();
            self.manager.lock().finish(id, action, callback);
        }

        self.manager.lock().reap();
        fired
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}
