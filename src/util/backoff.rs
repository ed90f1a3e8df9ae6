use std::time::Duration;

use rand::Rng;

/// Jitter applied around the computed delay, as a fraction of it.
pub(crate) const RANDOM_FACTOR: f64 = 0.5;

/// Exponential growth parameters shared by retry loops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BackoffConfig {
    pub initial: Duration,
    pub factor: f64,
    pub max: Duration,
}

pub(crate) fn calculate_backoff(config: BackoffConfig, backoff_count: u32) -> Duration {
    calculate_backoff_with_rng(config, backoff_count, &mut rand::thread_rng())
}

/// `initial * factor^count`, jittered by up to ±[`RANDOM_FACTOR`] and
/// clamped to `max`.
fn calculate_backoff_with_rng<R: Rng + ?Sized>(config: BackoffConfig, backoff_count: u32, rng: &mut R) -> Duration {
    let exponent = i32::try_from(backoff_count).unwrap_or(i32::MAX);
    let base = config.initial.as_secs_f64() * config.factor.powi(exponent);
    let jitter = RANDOM_FACTOR * base * rng.gen_range(-1.0..=1.0);
    let seconds = (base + jitter).clamp(0.0, config.max.as_secs_f64());
    Duration::from_secs_f64(seconds)
}
