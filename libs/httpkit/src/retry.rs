use std::time::Duration;

use rand::Rng;

use crate::config::ExponentialBackoff;

/// Upper bound for any single backoff, whatever the configuration says.
const MAX_BACKOFF_SECS: f64 = 86_400.0;

fn non_negative_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        fallback
    }
}

/// Delay before retry number `attempt` (zero-based).
///
/// `initial * multiplier^attempt`, capped at `max`. With jitter enabled a
/// random 0-25% is added, still capped at `max`. Invalid multipliers fall
/// back to `1.0` so a bad config never panics.
#[must_use]
pub fn calculate_backoff(backoff: &ExponentialBackoff, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let multiplier = non_negative_or(backoff.multiplier, 1.0);
    let initial = non_negative_or(backoff.initial.as_secs_f64(), 0.0);
    let max = non_negative_or(backoff.max.as_secs_f64(), MAX_BACKOFF_SECS).min(MAX_BACKOFF_SECS);

    let raw = initial * multiplier.powi(exponent);
    let delay = Duration::from_secs_f64(if raw.is_finite() { raw.clamp(0.0, max) } else { max });
    let delay = if backoff.jitter {
        delay + delay.mul_f64(rand::rng().random_range(0.0..=0.25))
    } else {
        delay
    };
    delay.min(Duration::from_secs_f64(max))
}
