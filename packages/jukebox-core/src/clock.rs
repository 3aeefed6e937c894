//! Time source abstraction.
//!
//! `server_time` is stamped at envelope-construction time, immediately before
//! fan-out, as seconds since the Unix epoch. Tests drive a [`TestClock`] instead
//! of sleeping real wall-clock time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Abstracts wall-clock access so room/ticker logic can be driven
/// deterministically in tests.
pub trait Clock: Send + Sync {
    /// Current time, in fractional seconds since the Unix epoch.
    fn now_secs(&self) -> f64;
}

/// Real wall-clock implementation backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}

/// Steppable clock for deterministic scenario tests. Stores millis internally
/// so steps can be expressed as whole milliseconds without float drift.
#[derive(Debug, Default)]
pub struct TestClock {
    millis: AtomicU64,
}

impl TestClock {
    /// Creates a test clock starting at time zero.
    pub fn new() -> Self {
        Self {
            millis: AtomicU64::new(0),
        }
    }

    /// Creates a test clock starting at the given number of seconds.
    pub fn at(start_secs: f64) -> Self {
        Self {
            millis: AtomicU64::new((start_secs * 1000.0) as u64),
        }
    }

    /// Advances the clock by the given number of seconds.
    pub fn advance(&self, secs: f64) {
        self.millis.fetch_add((secs * 1000.0) as u64, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now_secs(&self) -> f64 {
        self.millis.load(Ordering::SeqCst) as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_advances_with_real_time() {
        let clock = SystemClock;
        let t1 = clock.now_secs();
        assert!(t1 > 0.0);
    }

    #[test]
    fn test_clock_steps_deterministically() {
        let clock = TestClock::new();
        assert_eq!(clock.now_secs(), 0.0);
        clock.advance(1.5);
        assert_eq!(clock.now_secs(), 1.5);
        clock.advance(0.5);
        assert_eq!(clock.now_secs(), 2.0);
    }

    #[test]
    fn test_clock_at_starts_offset() {
        let clock = TestClock::at(100.0);
        assert_eq!(clock.now_secs(), 100.0);
    }
}
