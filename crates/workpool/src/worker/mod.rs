//! Worker pool for job execution
//!
//! This module provides:
//! - [`WorkerPool`] - Fixed set of workers fed by a FIFO intake queue
//! - [`QueueConfig`] - Bounded (blocking or rejecting) or unbounded intake
//! - [`PoolStats`] - Load and outcome counters
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       WorkerPool                             │
//! │                                                              │
//! │   submit() ──► ┌──────────────────────────────────────┐     │
//! │                │   Intake queue (FIFO, mpsc)          │     │
//! │                │   bounded: block / reject on full    │     │
//! │                │   unbounded                          │     │
//! │                └──────────────────┬───────────────────┘     │
//! │                                   │ fair async mutex        │
//! │                                   ▼                          │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │   Workers (worker_count Tokio tasks)                │    │
//! │  │   [attempt ─► backoff ─► attempt ...] ─► cleanup    │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use workpool::{Job, PoolConfig, QueueConfig, RetryPolicy, WorkerPool};
//!
//! let pool = WorkerPool::new(PoolConfig::new(
//!     4,
//!     RetryPolicy::DEFAULT,
//!     QueueConfig::bounded(100),
//! ))?;
//!
//! pool.submit(Job::new("hello".to_string()).with_handler(|msg| async move {
//!     println!("{msg}");
//!     Ok(())
//! }))
//! .await?;
//!
//! // Graceful shutdown: drains the queue
//! pool.stop().await;
//! ```

mod backpressure;
mod executor;
mod pool;
mod stats;

pub use backpressure::QueueConfig;
pub use pool::{PoolConfig, PoolError, PoolState, WorkerPool};
pub use stats::PoolStats;
