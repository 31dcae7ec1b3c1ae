//! Deterministic time sources for tests

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::upgrade::release::SleepFn;
use crate::upgrade::waiter::Clock;

/// A clock whose `sleep` advances simulated time without blocking.
#[derive(Clone, Debug)]
pub struct SimulatedClock {
    origin: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl SimulatedClock {
    /// Clock starting at the current instant
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Simulated time slept so far
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
    }
}

/// A resolver sleep that records each requested delay and returns at once.
#[derive(Clone, Debug, Default)]
pub struct RecordingSleep {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleep {
    /// Empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// The sleep function to hand to the resolver
    pub fn sleep_fn(&self) -> SleepFn {
        let delays = Arc::clone(&self.delays);
        Arc::new(move |delay| {
            delays.lock().unwrap().push(delay);
            Box::pin(async {})
        })
    }

    /// Delays requested so far
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}
