//! Sliding-window rate limiter for the ingest pipeline.
//!
//! Keyed per caller identity (typically the remote address), tightened from
//! the literal constant key the original used. Admission is checked before a
//! download is submitted to the queue; `retry_after` lets the handler answer
//! with a useful wait hint.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::Clock;

/// Token-bucket-by-timestamp-pruning limiter: each identity gets a window of
/// `max_events` within `window_secs`, keeping only timestamps still inside
/// the window on every check.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    max_events: usize,
    window_secs: f64,
    windows: Mutex<HashMap<String, Vec<f64>>>,
}

impl RateLimiter {
    /// Creates a rate limiter with the given window parameters.
    pub fn new(clock: Arc<dyn Clock>, max_events: usize, window_secs: f64) -> Self {
        Self {
            clock,
            max_events,
            window_secs,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn prune(&self, timestamps: &mut Vec<f64>, now: f64) {
        let cutoff = now - self.window_secs;
        timestamps.retain(|&t| t > cutoff);
    }

    /// Returns whether `identity` may proceed right now. On success, records
    /// the event so subsequent calls within the window are counted.
    pub fn allow(&self, identity: &str) -> bool {
        let now = self.clock.now_secs();
        let mut windows = self.windows.lock();
        let timestamps = windows.entry(identity.to_string()).or_default();
        self.prune(timestamps, now);

        if timestamps.len() >= self.max_events {
            return false;
        }
        timestamps.push(now);
        true
    }

    /// Seconds until `identity`'s oldest recorded event falls out of the
    /// window, i.e. how long the caller should wait before retrying.
    /// Returns 0 if the caller is already under the limit.
    pub fn retry_after(&self, identity: &str) -> f64 {
        let now = self.clock.now_secs();
        let mut windows = self.windows.lock();
        let timestamps = windows.entry(identity.to_string()).or_default();
        self.prune(timestamps, now);

        if timestamps.len() < self.max_events {
            return 0.0;
        }
        let oldest = timestamps.first().copied().unwrap_or(now);
        (oldest + self.window_secs - now).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;

    fn limiter(max_events: usize, window_secs: f64) -> (RateLimiter, Arc<TestClock>) {
        let clock = Arc::new(TestClock::new());
        let limiter = RateLimiter::new(clock.clone(), max_events, window_secs);
        (limiter, clock)
    }

    #[test]
    fn allows_up_to_max_events() {
        let (limiter, _clock) = limiter(5, 60.0);
        for _ in 0..5 {
            assert!(limiter.allow("1.2.3.4"));
        }
        assert!(!limiter.allow("1.2.3.4"));
    }

    #[test]
    fn keys_are_independent_per_identity() {
        let (limiter, _clock) = limiter(1, 60.0);
        assert!(limiter.allow("1.2.3.4"));
        assert!(!limiter.allow("1.2.3.4"));
        assert!(limiter.allow("5.6.7.8"));
    }

    #[test]
    fn window_expires_old_events() {
        let (limiter, clock) = limiter(1, 10.0);
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        clock.advance(10.1);
        assert!(limiter.allow("a"));
    }

    #[test]
    fn retry_after_reflects_remaining_window() {
        let (limiter, clock) = limiter(1, 10.0);
        assert!(limiter.allow("a"));
        assert!((limiter.retry_after("a") - 10.0).abs() < 0.001);
        clock.advance(4.0);
        assert!((limiter.retry_after("a") - 6.0).abs() < 0.001);
    }
}
