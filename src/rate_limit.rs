use crate::clock::SharedClock;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Per-process sliding-window limiter.
///
/// Counts admitted calls in the trailing `period` ending now. Denied calls are
/// not recorded and nothing is queued; the caller decides how to report it.
pub struct SlidingWindowRateLimiter {
    max_calls: usize,
    period: Duration,
    events: Mutex<VecDeque<Instant>>,
    clock: SharedClock,
}

impl SlidingWindowRateLimiter {
    /// Returns `None` when either limit is zero, which disables limiting.
    pub fn new(max_calls: usize, period: Duration, clock: SharedClock) -> Option<Self> {
        if max_calls == 0 || period.is_zero() {
            return None;
        }

        Some(Self {
            max_calls,
            period,
            events: Mutex::new(VecDeque::with_capacity(max_calls)),
            clock,
        })
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn allow(&self) -> bool {
        let mut events = self.events.lock();
        let now = self.clock.now();

        // `checked_sub` fails only while the process is younger than `period`,
        // in which case nothing can have aged out yet.
        if let Some(cutoff) = now.checked_sub(self.period) {
            while events.front().is_some_and(|&ts| ts <= cutoff) {
                events.pop_front();
            }
        }

        if events.len() >= self.max_calls {
            return false;
        }

        events.push_back(now);
        true
    }

    pub fn reset(&self) {
        self.events.lock().clear();
    }
}

impl std::fmt::Debug for SlidingWindowRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowRateLimiter")
            .field("max_calls", &self.max_calls)
            .field("period", &self.period)
            .field("recorded", &self.events.lock().len())
            .finish()
    }
}
