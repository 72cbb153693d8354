//! # Workpool
//!
//! A bounded, in-process worker pool for Tokio with per-job retries,
//! exponential backoff, cancellation and completion notification.
//!
//! ## Features
//!
//! - **Fixed concurrency**: `worker_count` workers, never more handlers running at once
//! - **Explicit backpressure**: bounded queues block or reject; unbounded is opt-in
//! - **Automatic retries**: validated retry policies with exponential backoff and optional jitter
//! - **Cancellation**: per-job cancel signals and deadlines, honored during backoff waits
//! - **Guaranteed cleanup**: every job's cleanup runs exactly once, whatever the outcome
//! - **Orderly shutdown**: `stop` drains queued jobs before workers exit
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Job<P>                              │
//! │  (payload, handler, cleanup, retry override, CancelSignal)  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ submit
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkerPool<P>                           │
//! │  (intake queue, workers, lifecycle Running→Stopping→Stopped)│
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       RetryPolicy                            │
//! │  (attempts, delay(a) = min(max, initial · factor^(a-1)))     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Outcomes
//!
//! Every job ends in exactly one [`JobOutcome`]: `Succeeded`, `Failed` (last
//! error kept), `Cancelled`, or one of the submission rejections `InvalidJob`,
//! `PoolClosed` and `QueueFull`. Handler panics are caught and count as failed
//! attempts, so they are retried like errors and end as `Failed`.
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use workpool::prelude::*;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = PoolConfig::new(3, RetryPolicy::DEFAULT, QueueConfig::bounded(16));
//! let pool = WorkerPool::new(config)?;
//!
//! let mut job = Job::new(7u64)
//!     .with_handler(|n| async move {
//!         anyhow::ensure!(n % 2 == 1, "even payload");
//!         Ok(())
//!     })
//!     .with_timeout(Duration::from_secs(30));
//! let handle = job.subscribe();
//!
//! pool.submit(job).await?;
//! let report = handle.wait().await?;
//! assert!(report.outcome.is_success());
//!
//! pool.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod job;
pub mod reliability;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::error::ConfigError;
    pub use crate::job::{
        CancelSignal, Job, JobHandle, JobOutcome, JobReport, JobResult, OutcomeKind,
    };
    pub use crate::reliability::RetryPolicy;
    pub use crate::worker::{PoolConfig, PoolError, PoolState, PoolStats, QueueConfig, WorkerPool};
}

// Re-export key types at crate root
pub use error::ConfigError;
pub use job::{
    CancelSignal, Job, JobHandle, JobHandler, JobId, JobOutcome, JobReport, JobResult, OutcomeKind,
};
pub use reliability::RetryPolicy;
pub use worker::{PoolConfig, PoolError, PoolState, PoolStats, QueueConfig, WorkerPool};
