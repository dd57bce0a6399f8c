use crossbeam::utils::Backoff;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::atomic::{fence, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Park time of [`SleepingWaitStrategy`] once spinning and yielding gave up
pub const SLEEP_STEP: Duration = Duration::from_micros(100);

/// Polls before [`YieldingWaitStrategy`] starts yielding its time slice
const YIELD_SPIN_TRIES: u32 = 100;

/// Selects the wait strategy used by both sides of a ring buffer.
///
/// Deserializes from `blocking`, `sleeping`, `yielding` or `busy_spin`
/// (`busy_spinning` is accepted too). Any other name falls back to
/// `Blocking` with a warning instead of failing the whole settings file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategyKind {
    /// Park on a condition variable; low idle CPU, wake-up latency bounded by `max_park`
    #[default]
    Blocking,
    /// Spin, then yield, then sleep in short steps
    Sleeping,
    /// Spin briefly, then yield the time slice on every poll
    Yielding,
    /// Spin with exponential backoff; lowest latency, burns a core per waiter
    BusySpin,
}

impl WaitStrategyKind {
    /// Resolve a configured name, falling back to `Blocking` for unknown ones
    pub fn from_name(name: &str) -> Self {
        match name {
            "blocking" => WaitStrategyKind::Blocking,
            "sleeping" => WaitStrategyKind::Sleeping,
            "yielding" => WaitStrategyKind::Yielding,
            "busy_spin" | "busy_spinning" => WaitStrategyKind::BusySpin,
            other => {
                warn!(wait_strategy = other, "unknown wait strategy, falling back to blocking");
                WaitStrategyKind::Blocking
            }
        }
    }

    pub(crate) fn build(self, max_park: Duration) -> Box<dyn WaitStrategy> {
        match self {
            WaitStrategyKind::Blocking => Box::new(BlockingWaitStrategy::new(max_park)),
            WaitStrategyKind::Sleeping => Box::new(SleepingWaitStrategy),
            WaitStrategyKind::Yielding => Box::new(YieldingWaitStrategy),
            WaitStrategyKind::BusySpin => Box::new(BusySpinWaitStrategy),
        }
    }
}

impl<'de> Deserialize<'de> for WaitStrategyKind {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(WaitStrategyKind::from_name(&name))
    }
}

/// Policy for suspending a thread until a condition on the buffer holds.
///
/// `wait_until` returns only once `ready` has returned true. Whoever changes
/// state that a waiter's condition reads must call `signal_all` afterwards.
pub trait WaitStrategy: Send + Sync + fmt::Debug {
    fn wait_until(&self, ready: &mut dyn FnMut() -> bool);

    fn signal_all(&self);
}

/// Mutex/condition-variable strategy.
///
/// Signalling only touches the mutex when someone is parked, so a busy
/// producer does not pay for the lock on every publish. Each park is bounded by
/// `max_park`, which caps the latency of a wake-up lost to a racing signal.
pub struct BlockingWaitStrategy {
    lock: Mutex<()>,
    cond: Condvar,
    waiters: AtomicUsize,
    max_park: Duration,
}

impl BlockingWaitStrategy {
    pub fn new(max_park: Duration) -> Self {
        Self {
            lock: Mutex::new(()),
            cond: Condvar::new(),
            waiters: AtomicUsize::new(0),
            max_park,
        }
    }

    pub fn max_park(&self) -> Duration {
        self.max_park
    }
}

impl fmt::Debug for BlockingWaitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingWaitStrategy")
            .field("waiters", &self.waiters.load(Ordering::Relaxed))
            .field("max_park", &self.max_park)
            .finish()
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_until(&self, ready: &mut dyn FnMut() -> bool) {
        if ready() {
            return;
        }

        let mut guard = self.lock.lock();
        self.waiters.fetch_add(1, Ordering::SeqCst);
        // pairs with the fence in signal_all
        fence(Ordering::SeqCst);
        while !ready() {
            self.cond.wait_for(&mut guard, self.max_park);
        }
        self.waiters.fetch_sub(1, Ordering::SeqCst);
    }

    fn signal_all(&self) {
        fence(Ordering::SeqCst);
        if self.waiters.load(Ordering::SeqCst) > 0 {
            let _guard = self.lock.lock();
            self.cond.notify_all();
        }
    }
}

/// Spin-then-yield strategy backed by crossbeam's `Backoff`
#[derive(Debug, Default, Clone, Copy)]
pub struct BusySpinWaitStrategy;

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait_until(&self, ready: &mut dyn FnMut() -> bool) {
        let backoff = Backoff::new();
        while !ready() {
            backoff.snooze();
        }
    }

    fn signal_all(&self) {}
}

/// Backs off through spinning and yielding, then sleeps [`SLEEP_STEP`]
/// between polls. Trades wake-up latency for idle CPU without a lock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SleepingWaitStrategy;

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_until(&self, ready: &mut dyn FnMut() -> bool) {
        let backoff = Backoff::new();
        while !ready() {
            if backoff.is_completed() {
                thread::sleep(SLEEP_STEP);
            } else {
                backoff.snooze();
            }
        }
    }

    fn signal_all(&self) {}
}

/// Polls a few times, then yields the time slice between polls
#[derive(Debug, Default, Clone, Copy)]
pub struct YieldingWaitStrategy;

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_until(&self, ready: &mut dyn FnMut() -> bool) {
        let mut tries = 0u32;
        while !ready() {
            if tries < YIELD_SPIN_TRIES {
                tries += 1;
                std::hint::spin_loop();
            } else {
                thread::yield_now();
            }
        }
    }

    fn signal_all(&self) {}
}
