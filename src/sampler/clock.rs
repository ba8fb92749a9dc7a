//! Time sources and tick scheduling
//!
//! All pipeline timestamps are monotonic milliseconds from a [`Clock`]. The
//! host's per-frame callback is modelled as a [`TickScheduler`] so the whole
//! loop can run headless.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    /// Milliseconds since the clock's time zero
    fn now_ms(&self) -> u64;
}

/// Wall-clock time from a shared start instant
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Arc<Instant>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Arc::new(Instant::now()),
        }
    }

    /// Share an existing timebase between components
    pub fn from_instant(start: Instant) -> Self {
        Self {
            start: Arc::new(start),
        }
    }

    pub fn start_instant(&self) -> Instant {
        *self.start
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock for tests and replays
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, ms: u64) -> u64 {
        self.now.fetch_add(ms, Ordering::SeqCst) + ms
    }

    /// Time never moves backwards
    pub fn set(&self, ms: u64) {
        self.now.fetch_max(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Stand-in for a display-refresh callback
pub trait TickScheduler: Send {
    /// Wait for the next tick. Returns false once the scheduler is done.
    fn wait_next_tick(&mut self) -> bool;
}

/// Sleeps out a fixed refresh period, compensating for time spent between ticks
#[derive(Debug)]
pub struct FixedRateScheduler {
    period: Duration,
    next_deadline: Option<Instant>,
}

impl FixedRateScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_deadline: None,
        }
    }

    /// Roughly one tick per display refresh at 60 Hz
    pub fn display_refresh() -> Self {
        Self::new(Duration::from_micros(16_667))
    }
}

impl TickScheduler for FixedRateScheduler {
    fn wait_next_tick(&mut self) -> bool {
        let now = Instant::now();
        let deadline = self.next_deadline.unwrap_or(now);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        // A slow tick pushes the schedule rather than bursting to catch up
        self.next_deadline = Some(deadline.max(now) + self.period);
        true
    }
}

/// Advances a [`ManualClock`] by a fixed step for a bounded number of ticks
#[derive(Debug)]
pub struct ManualScheduler {
    clock: ManualClock,
    step_ms: u64,
    remaining: usize,
}

impl ManualScheduler {
    pub fn new(clock: ManualClock, step_ms: u64, ticks: usize) -> Self {
        Self {
            clock,
            step_ms,
            remaining: ticks,
        }
    }
}

impl TickScheduler for ManualScheduler {
    fn wait_next_tick(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.clock.advance(self.step_ms);
        true
    }
}
