//! Reconnect backoff schedule

use rand::Rng;
use std::time::Duration;

/// Delay before the next reconnect attempt: `base * 2^failures` capped at
/// `max`, plus up to one second of jitter. `failures` counts consecutive
/// failed attempts so far, so the first reconnect waits roughly `base`.
pub(crate) fn delay(base: Duration, max: Duration, failures: u32) -> Duration {
    let exponent = 1u32.checked_shl(failures.min(16)).unwrap_or(u32::MAX);
    let scaled = base.checked_mul(exponent).unwrap_or(max).min(max);
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=1000));
    scaled + jitter
}
