//! Backoff delay computation
//!
//! Stateless functions of the attempt number and backoff parameters.

use std::time::Duration;

use rand::Rng;

/// Compute the delay to wait after `attempt` (1-based) before the next attempt.
///
/// ```text
/// delay(a) = min(max, initial * factor^(a - 1))
/// ```
///
/// The result is always within `[0, max]`. Overflow of the exponential term
/// saturates to `max`.
pub fn exponential_delay(initial: Duration, max: Duration, factor: f64, attempt: u32) -> Duration {
    if initial.is_zero() || attempt == 0 {
        return Duration::ZERO;
    }

    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let scaled = initial.as_secs_f64() * factor.powi(exponent);
    let capped = max.as_secs_f64();

    if !scaled.is_finite() || scaled >= capped {
        return max;
    }

    Duration::from_secs_f64(scaled.max(0.0))
}

/// Apply ±`jitter` randomness to `delay`, re-clamped to `[0, max]`.
///
/// A jitter of 0.1 means ±10%.
pub fn apply_jitter(delay: Duration, jitter: f64, max: Duration) -> Duration {
    if jitter <= 0.0 || delay.is_zero() {
        return delay;
    }

    let base = delay.as_secs_f64();
    let range = base * jitter.min(1.0);
    let offset = rand::thread_rng().gen_range(-range..=range);
    let jittered = (base + offset).clamp(0.0, max.as_secs_f64());

    Duration::from_secs_f64(jittered)
}
