//! Retry policy implementation

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::backoff;
use crate::error::ConfigError;

/// Configuration for job retries
///
/// Policies are validated when they are built, so a `RetryPolicy` value is
/// always usable: at least one attempt, a finite factor `>= 1.0`, and
/// `max_delay >= initial_delay`.
///
/// The serialized form stores delays in whole milliseconds, so sub-millisecond
/// precision does not survive a round trip.
///
/// # Example
///
/// ```
/// use workpool::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(60), 2.0)
///     .unwrap();
///
/// // Wait ~1s after the first attempt, ~2s after the second, ~4s after the third...
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawRetryPolicy", into = "RawRetryPolicy")]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    factor: f64,
    jitter: f64,
}

/// The default policy is [`RetryPolicy::DEFAULT`]; there is no other
/// implicit configuration.
impl Default for RetryPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl RetryPolicy {
    /// Convenience policy for callers without their own requirements
    ///
    /// - 3 attempts
    /// - 100ms initial delay
    /// - 10s max delay
    /// - 2x factor
    /// - no jitter
    pub const DEFAULT: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(10),
        factor: 2.0,
        jitter: 0.0,
    };

    /// Build a validated policy
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        factor: f64,
    ) -> Result<Self, ConfigError> {
        if max_attempts < 1 {
            return Err(ConfigError::InvalidAttempts(max_attempts));
        }
        if !factor.is_finite() || factor < 1.0 {
            return Err(ConfigError::InvalidFactor(factor));
        }
        if max_delay < initial_delay {
            return Err(ConfigError::InvalidDelays {
                initial: initial_delay,
                max: max_delay,
            });
        }

        Ok(Self {
            max_attempts,
            initial_delay,
            max_delay,
            factor,
            jitter: 0.0,
        })
    }

    /// Exponential backoff doubling from `initial_delay` up to `max_delay`
    pub fn exponential(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
    ) -> Result<Self, ConfigError> {
        Self::new(max_attempts, initial_delay, max_delay, 2.0)
    }

    /// Create a policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            factor: 1.0,
            jitter: 0.0,
        }
    }

    /// Create a policy with fixed intervals (no backoff)
    pub fn fixed(interval: Duration, max_attempts: u32) -> Result<Self, ConfigError> {
        Self::new(max_attempts, interval, interval, 1.0)
    }

    /// Set the jitter factor (clamped to 0.0-1.0)
    ///
    /// Jitter is applied after the cap and the result is clamped again, so
    /// delays never exceed `max_delay`.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_nan() {
            0.0
        } else {
            jitter.clamp(0.0, 1.0)
        };
        self
    }

    /// Maximum number of attempts, including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the first retry
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Upper bound on any computed delay
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Backoff multiplier
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Jitter fraction
    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Delay to wait after the given (1-based) attempt failed
    ///
    /// Returns `Duration::ZERO` once no attempts remain.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if !self.has_attempts_remaining(attempt) {
            return Duration::ZERO;
        }

        let delay =
            backoff::exponential_delay(self.initial_delay, self.max_delay, self.factor, attempt);
        backoff::apply_jitter(delay, self.jitter, self.max_delay)
    }

    /// The full sequence of waits between attempts (`max_attempts - 1` values)
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..self.max_attempts).map(move |attempt| self.delay_for_attempt(attempt))
    }

    /// Check if there are remaining attempts
    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        current_attempt < self.max_attempts
    }
}

/// Wire shape of a [`RetryPolicy`], validated on the way in
#[derive(Debug, Serialize, Deserialize)]
struct RawRetryPolicy {
    max_attempts: u32,
    #[serde(with = "duration_millis")]
    initial_delay: Duration,
    #[serde(with = "duration_millis")]
    max_delay: Duration,
    factor: f64,
    #[serde(default)]
    jitter: f64,
}

impl TryFrom<RawRetryPolicy> for RetryPolicy {
    type Error = ConfigError;

    fn try_from(raw: RawRetryPolicy) -> Result<Self, Self::Error> {
        if !(0.0..=1.0).contains(&raw.jitter) {
            return Err(ConfigError::InvalidJitter(raw.jitter));
        }
        let policy = Self::new(
            raw.max_attempts,
            raw.initial_delay,
            raw.max_delay,
            raw.factor,
        )?;
        Ok(policy.with_jitter(raw.jitter))
    }
}

impl From<RetryPolicy> for RawRetryPolicy {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            initial_delay: policy.initial_delay,
            max_delay: policy.max_delay,
            factor: policy.factor,
            jitter: policy.jitter,
        }
    }
}

/// Serde support for Duration as whole milliseconds
///
/// Sub-millisecond precision is truncated on serialization.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
