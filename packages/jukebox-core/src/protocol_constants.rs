//! Flat protocol and tuning constants, each documented with its rationale.

use std::time::Duration;

/// Interval between global ticker sweeps.
pub const TICKER_INTERVAL: Duration = Duration::from_secs(1);

/// How long the ingest coupling waits for a submitted download before
/// treating it as a failure.
pub const INGEST_AWAIT_DEADLINE: Duration = Duration::from_secs(10 * 60);

/// Default rate limiter admission count per window.
pub const DEFAULT_RATE_LIMIT_MAX: usize = 5;

/// Default rate limiter window, in seconds.
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: f64 = 60.0;

/// Default number of concurrent download workers.
pub const DEFAULT_DOWNLOAD_WORKERS: usize = 3;

/// Bitrate assumed for extracted audio, used by the fallback size estimate.
pub const EXTRACT_BITRATE_KBPS: u64 = 192;

/// Buffer applied to a size estimate derived only from duration (no
/// provider-reported filesize).
pub const SIZE_ESTIMATE_BUFFER_PCT_DURATION_ONLY: u64 = 30;

/// Buffer applied when a true reported filesize is known.
pub const SIZE_ESTIMATE_BUFFER_PCT_KNOWN_SIZE: u64 = 20;

/// Seconds trimmed off a reported duration to buffer against trailing
/// silence in extracted audio.
pub const TAIL_SILENCE_BUFFER_SECS: f64 = 1.25;

/// Number of smoke-test rooms pre-created at startup.
pub const DEFAULT_BOOTSTRAP_ROOM_COUNT: usize = 13;

/// Default roster page size for `broadcast_users`.
pub const DEFAULT_ROSTER_PAGE_LIMIT: usize = 10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_interval_is_one_second() {
        assert_eq!(TICKER_INTERVAL, Duration::from_secs(1));
    }
}
