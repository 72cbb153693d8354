//! Terminal job outcomes and completion delivery

use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::error;

use super::JobId;
use crate::worker::PoolError;

/// Terminal state of a job
///
/// Exactly one outcome applies to every job handed to a pool.
#[derive(Debug)]
pub enum JobOutcome {
    /// The handler returned `Ok`
    Succeeded,

    /// Every attempt failed; carries the last error
    Failed(anyhow::Error),

    /// The job's cancel signal triggered before it could finish
    Cancelled,

    /// The job was malformed and rejected at submission
    InvalidJob(String),

    /// The pool was stopping or stopped at submission
    PoolClosed,

    /// The bounded queue was full and the pool rejects instead of blocking
    QueueFull,
}

impl JobOutcome {
    /// The outcome without its payload
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Succeeded => OutcomeKind::Succeeded,
            Self::Failed(_) => OutcomeKind::Failed,
            Self::Cancelled => OutcomeKind::Cancelled,
            Self::InvalidJob(_) => OutcomeKind::InvalidJob,
            Self::PoolClosed => OutcomeKind::PoolClosed,
            Self::QueueFull => OutcomeKind::QueueFull,
        }
    }

    /// Check if the job succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// The last handler error, for failed jobs
    pub fn error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Payload-free tag of a [`JobOutcome`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Succeeded,
    Failed,
    Cancelled,
    InvalidJob,
    PoolClosed,
    QueueFull,
}

impl OutcomeKind {
    /// Whether the job was turned away before reaching a worker
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::InvalidJob | Self::PoolClosed | Self::QueueFull)
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::InvalidJob => write!(f, "invalid_job"),
            Self::PoolClosed => write!(f, "pool_closed"),
            Self::QueueFull => write!(f, "queue_full"),
        }
    }
}

/// Final report for a job, delivered through a [`JobHandle`]
#[derive(Debug)]
pub struct JobReport {
    /// Job ID
    pub job_id: JobId,

    /// How the job ended
    pub outcome: JobOutcome,

    /// Number of handler invocations
    pub attempts: u32,

    /// When the job was handed to the pool
    pub submitted_at: DateTime<Utc>,

    /// When the job reached its terminal state
    pub finished_at: DateTime<Utc>,
}

/// Receiving side of a job's completion report
///
/// Obtained from [`Job::subscribe`](super::Job::subscribe) before submission.
/// The report arrives for every outcome, rejections included.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    rx: oneshot::Receiver<JobReport>,
}

impl JobHandle {
    pub(crate) fn new(job_id: JobId, rx: oneshot::Receiver<JobReport>) -> Self {
        Self { job_id, rx }
    }

    /// ID of the job this handle observes
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Wait for the job to reach its terminal state
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ReportDropped`] if the job was discarded without a
    /// report, which only happens when the runtime shuts down mid-job.
    pub async fn wait(self) -> Result<JobReport, PoolError> {
        self.rx.await.map_err(|_| PoolError::ReportDropped)
    }
}

type Cleanup = Box<dyn FnOnce() + Send + 'static>;

/// Completion obligations of an accepted or rejected job
///
/// Runs the cleanup callback exactly once: through [`Completion::complete`]
/// on normal paths, or on drop if the job is discarded any other way.
pub(crate) struct Completion {
    job_id: JobId,
    submitted_at: DateTime<Utc>,
    cleanup: Option<Cleanup>,
    report_tx: Option<oneshot::Sender<JobReport>>,
}

impl Completion {
    pub(crate) fn new(
        job_id: JobId,
        cleanup: Option<Cleanup>,
        report_tx: Option<oneshot::Sender<JobReport>>,
    ) -> Self {
        Self {
            job_id,
            submitted_at: Utc::now(),
            cleanup,
            report_tx,
        }
    }

    pub(crate) fn mark_submitted(&mut self) {
        self.submitted_at = Utc::now();
    }

    /// Run cleanup, then deliver the report
    pub(crate) fn complete(mut self, outcome: JobOutcome, attempts: u32) {
        self.run_cleanup();

        if let Some(tx) = self.report_tx.take() {
            // The caller may have dropped the handle; nobody to tell then.
            let _ = tx.send(JobReport {
                job_id: self.job_id,
                outcome,
                attempts,
                submitted_at: self.submitted_at,
                finished_at: Utc::now(),
            });
        }
    }

    fn run_cleanup(&mut self) {
        let Some(cleanup) = self.cleanup.take() else {
            return;
        };

        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(cleanup)) {
            error!(
                job_id = %self.job_id,
                panic = %panic_message(panic.as_ref()),
                "Job cleanup panicked"
            );
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.run_cleanup();
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("job_id", &self.job_id)
            .field("submitted_at", &self.submitted_at)
            .field("has_cleanup", &self.cleanup.is_some())
            .field("has_report", &self.report_tx.is_some())
            .finish()
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
