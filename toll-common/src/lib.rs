use std::time::{Duration, Instant, SystemTime};

/// Returns the current UNIX timestamp in microseconds.
///
/// Falls back to `0` if the system clock is set before the UNIX epoch.
#[inline]
pub fn unix_micros() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}

/// Returns the time elapsed between `since` and `now` in seconds. Saturates at zero
/// if `now` is earlier than `since`.
#[inline]
pub fn elapsed_secs(since: Instant, now: Instant) -> f64 {
    now.saturating_duration_since(since).as_secs_f64()
}

/// Scales a duration by a floating point factor, saturating instead of panicking on
/// negative or non-finite factors.
#[inline]
pub fn scale_duration(duration: Duration, factor: f64) -> Duration {
    if !factor.is_finite() || factor <= 0.0 {
        return Duration::ZERO;
    }

    Duration::try_from_secs_f64(duration.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

#[allow(non_upper_case_globals)]
pub mod constants {
    pub const KiB: u32 = 1024;
}
