//! Delay strategies for spacing retry attempts.
//!
//! A strategy is a pure mapping from the index of the attempt that just failed
//! (1-based) and the [`DelaySettings`] to a wait duration. The jittered
//! variants draw from a caller-supplied [`Rng`], so a seeded generator makes
//! them reproducible.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DELAY, DEFAULT_JITTER_FLOOR, DEFAULT_MAX_DELAY, MAX_BACKOFF_EXPONENT,
};

/// Caller-supplied delay function: `(attempt, settings) -> delay`
pub type DelayFn = Arc<dyn Fn(u32, &DelaySettings) -> Duration + Send + Sync>;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Selects how the wait between attempts grows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayStrategy {
    /// Always the base delay
    Fixed,
    /// `delay * attempt`
    Linear,
    /// `delay * 2^(attempt - 1)`
    #[default]
    Exponential,
    /// Exponential value replaced by a uniform draw in `[jitter_floor, value]`
    RandomJitter,
    /// Exponential value replaced by a uniform draw in `[0, value]`
    FullJitter,
    /// The function stored in [`DelaySettings::custom`]
    Custom,
}

/// Parameters consumed by a [`DelayStrategy`]
#[derive(Clone)]
pub struct DelaySettings {
    /// Base delay
    pub delay: Duration,
    /// Cap applied after jitter; zero means uncapped
    pub max_delay: Duration,
    /// Lower bound of the random-jitter draw
    pub jitter_floor: Duration,
    /// Function used by [`DelayStrategy::Custom`]
    pub custom: Option<DelayFn>,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_floor: DEFAULT_JITTER_FLOOR,
            custom: None,
        }
    }
}

impl fmt::Debug for DelaySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelaySettings")
            .field("delay", &self.delay)
            .field("max_delay", &self.max_delay)
            .field("jitter_floor", &self.jitter_floor)
            .field("custom", &self.custom.as_ref().map(|_| "<function>"))
            .finish()
    }
}

impl DelaySettings {
    /// Apply the max-delay cap
    pub fn cap(&self, delay: Duration) -> Duration {
        if self.max_delay.is_zero() {
            delay
        } else {
            delay.min(self.max_delay)
        }
    }
}

impl DelayStrategy {
    /// Calculate the wait after `attempt` failed, using the thread-local RNG
    pub fn delay(&self, attempt: u32, settings: &DelaySettings) -> Duration {
        self.delay_with_rng(attempt, settings, &mut rand::thread_rng())
    }

    /// Calculate the wait after `attempt` failed, drawing jitter from `rng`.
    ///
    /// The result never exceeds `settings.max_delay` when that cap is set.
    pub fn delay_with_rng<R>(
        &self,
        attempt: u32,
        settings: &DelaySettings,
        rng: &mut R,
    ) -> Duration
    where
        R: Rng,
    {
        let attempt = attempt.max(1);
        let raw = match self {
            Self::Fixed => settings.delay,
            Self::Linear => settings.delay.saturating_mul(attempt),
            Self::Exponential => exponential_delay(attempt, settings),
            Self::RandomJitter => {
                let ceiling = exponential_delay(attempt, settings);
                let floor = settings.jitter_floor.min(ceiling);
                uniform_between(rng, floor, ceiling)
            }
            Self::FullJitter => {
                let ceiling = exponential_delay(attempt, settings);
                uniform_between(rng, Duration::ZERO, ceiling)
            }
            // Validation rejects Custom without a function; fall back to the base delay.
            Self::Custom => match &settings.custom {
                Some(custom) => custom(attempt, settings),
                None => settings.delay,
            },
        };

        settings.cap(raw)
    }
}

/// `delay * 2^(attempt - 1)`, capped, with the exponent clamped at
/// [`MAX_BACKOFF_EXPONENT`]
fn exponential_delay(attempt: u32, settings: &DelaySettings) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    let multiplier = 1_u128 << exponent;
    let nanos = settings.delay.as_nanos().saturating_mul(multiplier);
    settings.cap(duration_from_nanos(nanos))
}

/// Convert nanoseconds into a `Duration`, saturating at `Duration::MAX`
fn duration_from_nanos(nanos: u128) -> Duration {
    let secs = nanos / NANOS_PER_SEC;
    match u64::try_from(secs) {
        Ok(secs) => Duration::new(secs, (nanos % NANOS_PER_SEC) as u32),
        Err(_) => Duration::MAX,
    }
}

fn uniform_between<R>(rng: &mut R, low: Duration, high: Duration) -> Duration
where
    R: Rng,
{
    if high <= low {
        return high;
    }
    let low_nanos = low.as_nanos();
    let span = high.as_nanos() - low_nanos;
    // Durations past u64 nanoseconds are sampled at second granularity.
    match u64::try_from(span) {
        Ok(span) => duration_from_nanos(low_nanos + u128::from(rng.gen_range(0..=span))),
        Err(_) => {
            let secs = rng.gen_range(low.as_secs()..=high.as_secs());
            Duration::from_secs(secs).clamp(low, high)
        }
    }
}
