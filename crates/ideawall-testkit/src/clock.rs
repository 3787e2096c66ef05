//! Manually driven clock
//!
//! Lock TTLs are minutes and dedup windows are seconds; tests drive the
//! clock by hand instead of waiting.

use ideawall_core::{Clock, Timestamp};
use parking_lot::Mutex;
use std::time::Duration;

/// A [`Clock`] whose time only moves when the test says so.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Start at the Unix epoch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start at a specific instant.
    pub fn starting_at(now: Timestamp) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, now: Timestamp) {
        *self.now.lock() = now;
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}
