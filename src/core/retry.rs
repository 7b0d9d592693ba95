use std::time::Duration;

use super::error::ErrorKind;

/// Computes how long to wait before the next attempt.
///
/// The delay is `base_delay * 2^(attempt - 1)`, capped at `max_delay`. Rate-limited failures
/// prefer the server's hint (clamped into `[1s, max_delay]`) and otherwise grow with a steeper
/// `3^(attempt - 1)` factor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// The delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any computed delay, jitter included.
    pub max_delay: Duration,
    /// Whether to add up to 10% random jitter to each delay.
    pub jitter: bool,
}

/// Lower bound applied to server-provided rate limit hints.
const MIN_RATE_LIMIT_DELAY: Duration = Duration::from_secs(1);

/// Fraction of the computed delay that jitter may add.
const JITTER_RATIO: f64 = 0.1;

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// A policy without jitter, mostly useful for deterministic tests.
    #[must_use]
    pub fn fixed_base(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            jitter: false,
        }
    }

    /// The delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn compute_delay(
        &self,
        attempt: u32,
        kind: ErrorKind,
        server_hint: Option<Duration>,
    ) -> Duration {
        let max = self.max_delay;

        if kind == ErrorKind::RateLimited
            && let Some(hint) = server_hint
        {
            let floor = MIN_RATE_LIMIT_DELAY.min(max);
            return self.add_jitter(hint.clamp(floor, max));
        }

        let factor = if kind == ErrorKind::RateLimited { 3.0 } else { 2.0 };
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let raw = self.base_delay.as_secs_f64() * f64::powi(factor, exponent);
        let capped = raw.min(max.as_secs_f64());

        self.add_jitter(Duration::from_secs_f64(capped))
    }

    fn add_jitter(&self, delay: Duration) -> Duration {
        if !self.jitter {
            return delay;
        }
        let extra = delay.mul_f64(fastrand::f64() * JITTER_RATIO);
        (delay + extra).min(self.max_delay)
    }
}

/// Configuration for the automatic retry mechanism.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Enables or disables retries entirely.
    pub enabled: bool,
    /// Overrides the retry budget derived from the network profile.
    /// The total number of attempts is `max_retries + 1`.
    pub max_retries: Option<u32>,
    /// How many times an `Unknown` failure may be retried, regardless of the budget.
    pub unknown_retry_cap: u32,
    /// The delay strategy between attempts.
    pub backoff: BackoffPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: None,
            unknown_retry_cap: 1,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryConfig {
    /// A config that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// The retry budget for a request, given the profile's default.
    #[must_use]
    pub fn budget(&self, profile_max_retries: u32) -> u32 {
        if self.enabled {
            self.max_retries.unwrap_or(profile_max_retries)
        } else {
            0
        }
    }

    /// Whether attempt number `attempt` (1-based) that failed with `kind` may be followed by
    /// another one.
    #[must_use]
    pub fn allows_retry(&self, attempt: u32, kind: ErrorKind, budget: u32) -> bool {
        if attempt > budget {
            return false;
        }
        kind != ErrorKind::Unknown || attempt <= self.unknown_retry_cap
    }
}
