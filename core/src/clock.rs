//! Clock port and adapters.
//!
//! The rate guard and the membership ledger read time only through [`Clock`]
//! so tests can drive it deterministically with [`ManualClock`].

use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};

/// Source of monotonic and wall-clock time.
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;

    /// Get the current wall-clock time, used for persisted timestamps.
    fn utc_now(&self) -> DateTime<Utc>;
}

/// System clock backed by `Instant::now()` and `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
struct Reading {
    instant: Instant,
    wall: DateTime<Utc>,
}

/// Manually advanced clock.
///
/// Clones share the same underlying reading, so advancing one clone advances
/// all of them. Both time sources move together.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<Reading>>,
}

impl ManualClock {
    /// Create a clock frozen at `instant` and `wall`.
    pub fn new(instant: Instant, wall: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(Reading { instant, wall })),
        }
    }

    /// Create a clock frozen at the current system time.
    pub fn starting_now() -> Self {
        Self::new(Instant::now(), Utc::now())
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current.instant += by;
        current.wall += TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
    }

    fn read(&self) -> Reading {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_now()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.read().instant
    }

    fn utc_now(&self) -> DateTime<Utc> {
        self.read().wall
    }
}
