//! Intake queue and backpressure modes
//!
//! The intake queue is the only structure shared by submitters and workers.
//! Its mode decides what happens when submissions outpace the workers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::ConfigError;
use crate::job::QueuedJob;

/// Intake queue configuration
///
/// Has no `Default`. Callers pick between backpressure (bounded) and
/// unbounded memory growth.
///
/// # Example
///
/// ```
/// use workpool::QueueConfig;
///
/// let blocking = QueueConfig::bounded(128);
/// let rejecting = QueueConfig::bounded_rejecting(128);
/// let unbounded = QueueConfig::unbounded();
///
/// assert!(blocking.block_on_full());
/// assert!(!rejecting.block_on_full());
/// assert_eq!(unbounded.capacity(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum QueueConfig {
    /// At most `capacity` jobs wait in the queue
    Bounded {
        capacity: usize,
        /// Wait for space when full (`true`) or reject with `QueueFull`
        #[serde(default = "default_block_on_full")]
        block_on_full: bool,
    },

    /// No limit on waiting jobs
    Unbounded,
}

fn default_block_on_full() -> bool {
    true
}

impl QueueConfig {
    /// Bounded queue; submitters wait for space when it is full
    pub fn bounded(capacity: usize) -> Self {
        Self::Bounded {
            capacity,
            block_on_full: true,
        }
    }

    /// Bounded queue; submissions fail with `QueueFull` when it is full
    pub fn bounded_rejecting(capacity: usize) -> Self {
        Self::Bounded {
            capacity,
            block_on_full: false,
        }
    }

    /// Unbounded queue
    pub fn unbounded() -> Self {
        Self::Unbounded
    }

    /// Queue capacity, `None` when unbounded
    pub fn capacity(&self) -> Option<usize> {
        match self {
            Self::Bounded { capacity, .. } => Some(*capacity),
            Self::Unbounded => None,
        }
    }

    /// Whether a full queue blocks submitters
    pub fn block_on_full(&self) -> bool {
        match self {
            Self::Bounded { block_on_full, .. } => *block_on_full,
            Self::Unbounded => false,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Self::Bounded { capacity: 0, .. } = self {
            return Err(ConfigError::InvalidQueueCapacity);
        }
        Ok(())
    }
}

/// Why a job could not be enqueued; the job is handed back
pub(crate) enum EnqueueError<P> {
    /// Intake is closed (the pool is stopping)
    Closed(QueuedJob<P>),
    /// Bounded, non-blocking and full
    Full(QueuedJob<P>),
    /// Stop began while waiting for space
    Shutdown(QueuedJob<P>),
}

/// Sending half of the intake queue
pub(crate) enum IntakeSender<P> {
    Bounded {
        tx: mpsc::Sender<QueuedJob<P>>,
        block_on_full: bool,
    },
    Unbounded(mpsc::UnboundedSender<QueuedJob<P>>),
}

impl<P> Clone for IntakeSender<P> {
    fn clone(&self) -> Self {
        match self {
            Self::Bounded { tx, block_on_full } => Self::Bounded {
                tx: tx.clone(),
                block_on_full: *block_on_full,
            },
            Self::Unbounded(tx) => Self::Unbounded(tx.clone()),
        }
    }
}

impl<P> IntakeSender<P> {
    /// Enqueue a job according to the queue mode
    ///
    /// A blocking send gives up as soon as `shutdown` is cancelled.
    pub(crate) async fn send(
        &self,
        job: QueuedJob<P>,
        shutdown: &CancellationToken,
    ) -> Result<(), EnqueueError<P>> {
        match self {
            Self::Unbounded(tx) => tx.send(job).map_err(|e| EnqueueError::Closed(e.0)),
            Self::Bounded {
                tx,
                block_on_full: false,
            } => tx.try_send(job).map_err(|e| match e {
                mpsc::error::TrySendError::Full(job) => EnqueueError::Full(job),
                mpsc::error::TrySendError::Closed(job) => EnqueueError::Closed(job),
            }),
            Self::Bounded {
                tx,
                block_on_full: true,
            } => {
                let permit = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => return Err(EnqueueError::Shutdown(job)),
                    permit = tx.reserve() => permit,
                };
                match permit {
                    Ok(permit) => {
                        permit.send(job);
                        Ok(())
                    }
                    Err(_) => Err(EnqueueError::Closed(job)),
                }
            }
        }
    }
}

/// Receiving half of the intake queue
pub(crate) enum IntakeReceiver<P> {
    Bounded(mpsc::Receiver<QueuedJob<P>>),
    Unbounded(mpsc::UnboundedReceiver<QueuedJob<P>>),
}

impl<P> IntakeReceiver<P> {
    /// Next job, or `None` once the intake is closed and drained
    pub(crate) async fn recv(&mut self) -> Option<QueuedJob<P>> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// Receiver shared by all workers
///
/// The async mutex is fair, so idle workers are served in the order they
/// started waiting. It is held only while waiting for the next job.
pub(crate) type SharedIntake<P> = Arc<Mutex<IntakeReceiver<P>>>;

/// Build the intake queue for a validated configuration
pub(crate) fn intake<P>(config: &QueueConfig) -> (IntakeSender<P>, SharedIntake<P>) {
    let (tx, rx) = match *config {
        QueueConfig::Bounded {
            capacity,
            block_on_full,
        } => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (
                IntakeSender::Bounded { tx, block_on_full },
                IntakeReceiver::Bounded(rx),
            )
        }
        QueueConfig::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (IntakeSender::Unbounded(tx), IntakeReceiver::Unbounded(rx))
        }
    };
    (tx, Arc::new(Mutex::new(rx)))
}
