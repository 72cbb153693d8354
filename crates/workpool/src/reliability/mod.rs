//! Reliability patterns for job execution
//!
//! This module provides:
//! - [`RetryPolicy`] - Validated retry configuration with exponential backoff
//! - [`backoff`] - Stateless delay computation used between attempts

pub mod backoff;
mod retry;

pub use retry::RetryPolicy;
