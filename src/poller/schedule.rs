//! Delay computations for the polling loop.

use std::time::Duration;

use crate::store::models::{LocalData, Preferences};

/// Consecutive failures after which polling stops.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 5;
/// First backoff delay; doubles with every further failure.
pub const BACKOFF_BASE_DELAY_SECS: u64 = 30;
/// Shortest delay the timer will be armed with.
pub const MIN_SCHEDULABLE_INTERVAL_SECS: u64 = 30;

/// `base * 2^(error_count - 1)`, saturating.
pub fn backoff_delay(base: Duration, error_count: u32) -> Duration {
    let exponent = error_count.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent)
}

/// In-play interval while any watched match is live, otherwise the idle one.
pub fn poll_interval(prefs: &Preferences, local: &LocalData) -> Duration {
    let secs = if local.snapshot.live_count(&local.watchlist) > 0 {
        prefs.polling.in_play_interval_secs
    } else {
        prefs.polling.idle_interval_secs
    };
    Duration::from_secs(secs)
}
