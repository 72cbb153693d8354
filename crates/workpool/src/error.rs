//! Construction-time errors

use std::time::Duration;

use thiserror::Error;

/// Errors raised while building a [`RetryPolicy`](crate::RetryPolicy),
/// [`PoolConfig`](crate::PoolConfig) or [`WorkerPool`](crate::WorkerPool).
///
/// These are never corrected silently: a bad value fails construction.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// Worker count must be at least 1
    #[error("worker count must be at least 1, got {0}")]
    InvalidWorkerCount(usize),

    /// Retry attempts must be at least 1
    #[error("retry attempts must be at least 1, got {0}")]
    InvalidAttempts(u32),

    /// Backoff factor must be finite and at least 1.0
    #[error("backoff factor must be a finite number >= 1.0, got {0}")]
    InvalidFactor(f64),

    /// Maximum delay is below the initial delay
    #[error("max delay {max:?} is less than initial delay {initial:?}")]
    InvalidDelays { initial: Duration, max: Duration },

    /// Jitter must lie in [0.0, 1.0]
    #[error("jitter must be within 0.0..=1.0, got {0}")]
    InvalidJitter(f64),

    /// Bounded queue capacity must be at least 1
    #[error("bounded queue capacity must be at least 1")]
    InvalidQueueCapacity,

    /// A required environment variable is not set
    #[error("missing environment variable: {0}")]
    MissingEnv(String),

    /// An environment variable could not be parsed
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },

    /// The pool was constructed outside of a Tokio runtime
    #[error("worker pool must be created inside a Tokio runtime")]
    NoRuntime,
}
