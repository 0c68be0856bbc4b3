//! C1: monotonic-and-wall time source, injectable for tests.
//!
//! Production code talks to [`SystemClock`]. Tests that need deterministic
//! control over backoff sleeps, drain timers and snapshot ages use
//! [`TestClock`], which only advances when told to.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Wall time (for `queriedAt`/age computations) and a monotonic instant
/// (for timers and backoff), both abstracted so tests can control them.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current wall-clock time, used to stamp `queriedAt`.
    fn utc_now(&self) -> DateTime<Utc>;

    /// Current monotonic instant, used for elapsed-time comparisons
    /// (breaker `openedAt`, waiter deadlines, backoff scheduling).
    fn now(&self) -> Instant;
}

/// The OS clock. Used everywhere outside of tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when [`TestClock::advance`] is called.
///
/// Both the wall-clock and monotonic readings advance together, by the same
/// amount, so `ageMs` computed from either stays consistent in tests.
#[derive(Debug, Clone)]
pub struct TestClock {
    inner: Arc<Mutex<TestClockState>>,
}

#[derive(Debug)]
struct TestClockState {
    utc: DateTime<Utc>,
    monotonic: Instant,
}

impl TestClock {
    /// Creates a clock starting at the given wall-clock instant.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TestClockState {
                utc: start,
                monotonic: Instant::now(),
            })),
        }
    }

    /// Advances both the wall-clock and monotonic readings by `d`.
    pub fn advance(&self, d: Duration) {
        let mut state = self.inner.lock().expect("test clock lock poisoned");
        state.utc += chrono::Duration::from_std(d).expect("duration out of range");
        state.monotonic += d;
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for TestClock {
    fn utc_now(&self) -> DateTime<Utc> {
        self.inner.lock().expect("test clock lock poisoned").utc
    }

    fn now(&self) -> Instant {
        self.inner.lock().expect("test clock lock poisoned").monotonic
    }
}
