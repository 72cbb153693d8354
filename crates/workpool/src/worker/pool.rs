//! Worker pool for job execution
//!
//! Manages a fixed set of workers, the intake queue, and orderly shutdown.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, Instrument};

use super::backpressure::{self, EnqueueError, IntakeSender, QueueConfig, SharedIntake};
use super::executor;
use super::stats::{PoolCounters, PoolStats};
use crate::error::ConfigError;
use crate::job::{Completion, Job, JobId, JobOutcome};
use crate::reliability::RetryPolicy;

/// Worker pool configuration
///
/// Every field is explicit: the worker count, the default retry policy and the
/// queue mode are all required by [`PoolConfig::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool name, used in logs
    #[serde(default = "default_name")]
    pub name: String,

    /// Number of concurrent workers (>= 1)
    pub worker_count: usize,

    /// Retry policy for jobs that carry none
    pub default_retry: RetryPolicy,

    /// Intake queue mode
    pub queue: QueueConfig,
}

fn default_name() -> String {
    "default".to_string()
}

impl PoolConfig {
    /// Create a new pool configuration
    pub fn new(worker_count: usize, default_retry: RetryPolicy, queue: QueueConfig) -> Self {
        Self {
            name: default_name(),
            worker_count,
            default_retry,
            queue,
        }
    }

    /// Set the pool name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count < 1 {
            return Err(ConfigError::InvalidWorkerCount(self.worker_count));
        }
        self.queue.validate()
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `WORKPOOL_NAME`: Pool name (default: "default")
    /// - `WORKPOOL_WORKERS`: Worker count (required)
    /// - `WORKPOOL_QUEUE`: `unbounded` or a bounded capacity (required)
    /// - `WORKPOOL_BLOCK_ON_FULL`: Block submitters on a full bounded queue (default: true)
    /// - `WORKPOOL_RETRY_ATTEMPTS`: Max attempts per job (default: 3)
    /// - `WORKPOOL_RETRY_INITIAL_DELAY_MS`: Delay before the first retry (default: 100)
    /// - `WORKPOOL_RETRY_MAX_DELAY_MS`: Delay cap (default: 10000)
    /// - `WORKPOOL_RETRY_FACTOR`: Backoff multiplier (default: 2.0)
    /// - `WORKPOOL_RETRY_JITTER`: Jitter fraction (default: 0.0)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading values through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let name = lookup("WORKPOOL_NAME").unwrap_or_else(default_name);
        let worker_count = parse_required(&lookup, "WORKPOOL_WORKERS")?;

        let queue_key = "WORKPOOL_QUEUE";
        let queue_value =
            lookup(queue_key).ok_or_else(|| ConfigError::MissingEnv(queue_key.to_string()))?;
        let block_on_full = parse_bool(&lookup, "WORKPOOL_BLOCK_ON_FULL")?.unwrap_or(true);
        let queue = if queue_value.trim().eq_ignore_ascii_case("unbounded") {
            QueueConfig::Unbounded
        } else {
            let capacity = queue_value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: queue_key.to_string(),
                value: queue_value.clone(),
            })?;
            QueueConfig::Bounded {
                capacity,
                block_on_full,
            }
        };

        let defaults = RetryPolicy::DEFAULT;
        let attempts = parse_optional(&lookup, "WORKPOOL_RETRY_ATTEMPTS")?
            .unwrap_or(defaults.max_attempts());
        let initial = parse_optional(&lookup, "WORKPOOL_RETRY_INITIAL_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.initial_delay());
        let max = parse_optional(&lookup, "WORKPOOL_RETRY_MAX_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.max_delay());
        let factor =
            parse_optional(&lookup, "WORKPOOL_RETRY_FACTOR")?.unwrap_or(defaults.factor());
        let jitter: f64 = parse_optional(&lookup, "WORKPOOL_RETRY_JITTER")?.unwrap_or(0.0);
        if !(0.0..=1.0).contains(&jitter) {
            return Err(ConfigError::InvalidJitter(jitter));
        }

        let default_retry = RetryPolicy::new(attempts, initial, max, factor)?.with_jitter(jitter);

        let config = Self::new(worker_count, default_retry, queue).with_name(name);
        config.validate()?;
        Ok(config)
    }
}

fn parse_optional<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value,
            }),
    }
}

fn parse_required<F, T>(lookup: &F, key: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    parse_optional(lookup, key)?.ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn parse_bool<F>(lookup: &F, key: &str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnv {
                key: key.to_string(),
                value,
            }),
        },
    }
}

/// Worker pool lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    /// Accepting submissions, workers executing
    Running,
    /// Draining: no new submissions, queued jobs still run
    Stopping,
    /// All workers have exited
    Stopped,
}

impl std::fmt::Display for PoolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Worker pool errors
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PoolError {
    /// Submission after shutdown began
    #[error("worker pool is closed")]
    PoolClosed,

    /// Bounded queue full in rejecting mode
    #[error("intake queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The job is malformed
    #[error("invalid job: {0}")]
    InvalidJob(String),

    /// A job was discarded without delivering its report
    #[error("job was dropped before reporting an outcome")]
    ReportDropped,
}

/// Worker pool for executing jobs
///
/// Workers are Tokio tasks started by [`WorkerPool::new`]; they run until the
/// pool is stopped (or dropped) and the intake queue is drained.
///
/// # Example
///
/// ```ignore
/// use workpool::{Job, PoolConfig, QueueConfig, RetryPolicy, WorkerPool};
///
/// let config = PoolConfig::new(4, RetryPolicy::DEFAULT, QueueConfig::bounded(64));
/// let pool = WorkerPool::new(config)?;
///
/// pool.submit(Job::new(42u64).with_handler(|n| async move {
///     process(n).await
/// }))
/// .await?;
///
/// // ... later, drain and stop
/// pool.stop().await;
/// ```
pub struct WorkerPool<P> {
    config: PoolConfig,
    intake: parking_lot::Mutex<Option<IntakeSender<P>>>,
    shutdown: CancellationToken,
    state: watch::Sender<PoolState>,
    workers: TaskTracker,
    counters: Arc<PoolCounters>,
}

impl<P> WorkerPool<P>
where
    P: Clone + Send + 'static,
{
    /// Create a pool and start its workers
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an invalid configuration or when called
    /// outside a Tokio runtime.
    pub fn new(config: PoolConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

        let (tx, rx) = backpressure::intake(&config.queue);
        let counters = Arc::new(PoolCounters::new());
        let default_retry = Arc::new(config.default_retry.clone());

        let workers = TaskTracker::new();
        for worker in 0..config.worker_count {
            let span = tracing::info_span!("worker", pool = %config.name, worker);
            workers.spawn_on(
                worker_loop(
                    worker,
                    Arc::clone(&rx),
                    Arc::clone(&default_retry),
                    Arc::clone(&counters),
                )
                .instrument(span),
                &runtime,
            );
        }

        info!(
            pool = %config.name,
            worker_count = config.worker_count,
            queue = ?config.queue,
            "Started worker pool"
        );

        let (state, _) = watch::channel(PoolState::Running);

        Ok(Self {
            config,
            intake: parking_lot::Mutex::new(Some(tx)),
            shutdown: CancellationToken::new(),
            state,
            workers,
            counters,
        })
    }

    /// Submit a job for execution
    ///
    /// Returns once the job is enqueued, without waiting for it to run. In
    /// bounded blocking mode this waits for queue space, and gives up with
    /// [`PoolError::PoolClosed`] if [`stop`](Self::stop) begins meanwhile.
    ///
    /// Every rejection is terminal for the job: its cleanup runs and its
    /// report (if subscribed) carries the matching outcome.
    #[instrument(skip(self, job), fields(pool = %self.config.name, job_id = %job.id()))]
    pub async fn submit(&self, job: Job<P>) -> Result<JobId, PoolError> {
        self.counters.job_submitted();
        let job_id = job.id();

        let mut queued = match job.into_parts() {
            Ok(queued) => queued,
            Err(completion) => {
                let reason = "job has no handler".to_string();
                self.reject(completion, JobOutcome::InvalidJob(reason.clone()));
                return Err(PoolError::InvalidJob(reason));
            }
        };
        queued.completion.mark_submitted();

        let Some(sender) = self.intake.lock().clone() else {
            debug!("Rejecting job, pool is closed");
            self.reject(queued.completion, JobOutcome::PoolClosed);
            return Err(PoolError::PoolClosed);
        };

        self.counters.job_enqueued();
        match sender.send(queued, &self.shutdown).await {
            Ok(()) => {
                debug!("Job enqueued");
                Ok(job_id)
            }
            Err(EnqueueError::Full(rejected)) => {
                self.counters.enqueue_aborted();
                let capacity = self.config.queue.capacity().unwrap_or_default();
                debug!(capacity, "Rejecting job, queue is full");
                self.reject(rejected.completion, JobOutcome::QueueFull);
                Err(PoolError::QueueFull { capacity })
            }
            Err(EnqueueError::Closed(rejected) | EnqueueError::Shutdown(rejected)) => {
                self.counters.enqueue_aborted();
                debug!("Rejecting job, pool closed while enqueuing");
                self.reject(rejected.completion, JobOutcome::PoolClosed);
                Err(PoolError::PoolClosed)
            }
        }
    }

    /// Stop accepting jobs, drain the queue and wait for all workers to exit
    ///
    /// Jobs already queued run to completion, retries included. Concurrent
    /// and repeated calls wait until the pool is stopped. Dropping the returned
    /// future (e.g. under a timeout) does not interrupt the drain; calling
    /// `stop` again resumes waiting.
    #[instrument(skip(self), fields(pool = %self.config.name))]
    pub async fn stop(&self) {
        let initiated = self.state.send_if_modified(|state| {
            if *state == PoolState::Running {
                *state = PoolState::Stopping;
                true
            } else {
                false
            }
        });

        if initiated {
            info!(
                queued = self.counters.snapshot().queued,
                in_flight = self.counters.in_flight(),
                "Initiating graceful shutdown"
            );

            // Closing intake lets workers exit once the queue is empty; cancelling
            // releases submitters blocked on a full queue.
            self.intake.lock().take();
            self.shutdown.cancel();
            self.workers.close();
        }

        self.workers.wait().await;

        let finished = self.state.send_if_modified(|state| {
            if *state == PoolState::Stopped {
                false
            } else {
                *state = PoolState::Stopped;
                true
            }
        });
        if finished {
            info!("Worker pool stopped");
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> PoolState {
        *self.state.borrow()
    }

    /// Check if the pool accepts submissions
    pub fn is_accepting(&self) -> bool {
        self.state() == PoolState::Running
    }

    /// Snapshot of the pool's counters
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot()
    }

    /// Number of workers
    pub fn worker_count(&self) -> usize {
        self.config.worker_count
    }

    /// Pool name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The pool's configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn reject(&self, completion: Completion, outcome: JobOutcome) {
        self.counters.job_finished(outcome.kind());
        completion.complete(outcome, 0);
    }
}

impl<P> std::fmt::Debug for WorkerPool<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("state", &*self.state.borrow())
            .field("stats", &self.counters.snapshot())
            .finish()
    }
}

/// Dequeue and run jobs until the intake is closed and drained
async fn worker_loop<P>(
    worker: usize,
    intake: SharedIntake<P>,
    default_retry: Arc<RetryPolicy>,
    counters: Arc<PoolCounters>,
) where
    P: Clone + Send + 'static,
{
    debug!(worker, "Worker started");

    loop {
        let next = {
            let mut rx = intake.lock().await;
            rx.recv().await
        };

        let Some(job) = next else {
            break;
        };

        counters.job_started();
        debug!(job_id = %job.id, "Worker picked up job");
        executor::run_job(job, &default_retry, &counters).await;
    }

    debug!(worker, "Worker exited");
}
