//! Rate-limit gate for user-triggered actions
//!
//! Calls that arrive too soon are dropped, not queued or coalesced.

use std::time::{Duration, Instant};

/// Lets a caller proceed at most once per `interval`
#[derive(Debug, Clone)]
pub struct Debouncer {
    interval: Duration,
    last_call: Option<Instant>,
}

impl Debouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true and records the call if at least `interval` has passed
    /// since the last recorded call. Otherwise returns false and leaves the
    /// record untouched.
    pub fn should_proceed(&mut self) -> bool {
        self.should_proceed_at(Instant::now())
    }

    fn should_proceed_at(&mut self, now: Instant) -> bool {
        let ready = match self.last_call {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if ready {
            self.last_call = Some(now);
        }
        ready
    }

    /// Forgets the last call so the next one always proceeds
    pub fn reset(&mut self) {
        self.last_call = None;
    }
}
