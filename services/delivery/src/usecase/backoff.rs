use std::time::Duration;

use rand::RngExt;

/// `base * 2^(attempt - 1)`, capped at `max`. Attempt numbers start at 1.
pub fn exponential(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exp).min(max)
}

/// Add up to `fraction` of `delay` as random jitter.
pub fn with_jitter(delay: Duration, fraction: f64) -> Duration {
    let spread = delay.as_secs_f64() * fraction;
    if spread <= 0.0 {
        return delay;
    }
    let extra = rand::rng().random_range(0.0..spread);
    delay + Duration::from_secs_f64(extra)
}
