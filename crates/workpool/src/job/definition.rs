//! Job definition

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::outcome::{Completion, JobHandle, JobReport};
use super::{CancelSignal, JobId};
use crate::reliability::RetryPolicy;

/// Result of a single handler invocation
pub type JobResult = anyhow::Result<()>;

/// Type-erased job handler
pub type JobHandler<P> = Arc<dyn Fn(P) -> BoxFuture<'static, JobResult> + Send + Sync>;

/// A unit of work for a [`WorkerPool`](crate::WorkerPool)
///
/// The handler receives a clone of the payload on every attempt, so it must be
/// safe to call more than once.
///
/// # Example
///
/// ```ignore
/// let mut job = Job::new(order_id)
///     .with_handler(|order_id: u64| async move {
///         charge(order_id).await?;
///         Ok(())
///     })
///     .with_cleanup(move || done_tx.send(()).unwrap())
///     .with_retry(RetryPolicy::fixed(Duration::from_secs(1), 5)?);
///
/// let handle = job.subscribe();
/// pool.submit(job).await?;
/// let report = handle.wait().await?;
/// ```
pub struct Job<P> {
    id: JobId,
    payload: P,
    handler: Option<JobHandler<P>>,
    cleanup: Option<Box<dyn FnOnce() + Send + 'static>>,
    retry: Option<RetryPolicy>,
    cancel: CancelSignal,
    report_tx: Option<oneshot::Sender<JobReport>>,
}

impl<P> Job<P>
where
    P: Clone + Send + 'static,
{
    /// Create a job carrying `payload`
    ///
    /// A job without a handler is rejected at submission.
    pub fn new(payload: P) -> Self {
        Self {
            id: Uuid::now_v7(),
            payload,
            handler: None,
            cleanup: None,
            retry: None,
            cancel: CancelSignal::new(),
            report_tx: None,
        }
    }

    /// Set the function executed for each attempt
    pub fn with_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        let handler: JobHandler<P> = Arc::new(move |payload: P| handler(payload).boxed());
        self.handler = Some(handler);
        self
    }

    /// Set an already type-erased handler, e.g. one shared across jobs
    pub fn with_shared_handler(mut self, handler: JobHandler<P>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Set a callback run exactly once when the job reaches a terminal state
    pub fn with_cleanup<F>(mut self, cleanup: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.cleanup = Some(Box::new(cleanup));
        self
    }

    /// Override the pool's default retry policy for this job
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Attach a cancellation signal
    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = signal;
        self
    }

    /// Cancel the job automatically once `timeout` has elapsed from now
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.cancel = self.cancel.with_timeout(timeout);
        self
    }

    /// Subscribe to this job's completion report
    ///
    /// Calling this again replaces the previous subscription.
    pub fn subscribe(&mut self) -> JobHandle {
        let (tx, rx) = oneshot::channel();
        self.report_tx = Some(tx);
        JobHandle::new(self.id, rx)
    }

    /// Job ID
    pub fn id(&self) -> JobId {
        self.id
    }

    /// The payload passed to the handler
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// The cancellation signal
    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Retry override, if any
    pub fn retry(&self) -> Option<&RetryPolicy> {
        self.retry.as_ref()
    }

    /// Check whether a handler has been set
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Split into the runnable part and its completion obligations
    ///
    /// Fails with the completion alone when there is no handler.
    pub(crate) fn into_parts(self) -> Result<QueuedJob<P>, Completion> {
        let completion = Completion::new(self.id, self.cleanup, self.report_tx);
        match self.handler {
            Some(handler) => Ok(QueuedJob {
                id: self.id,
                payload: self.payload,
                handler,
                retry: self.retry,
                cancel: self.cancel,
                completion,
            }),
            None => Err(completion),
        }
    }
}

impl<P> std::fmt::Debug for Job<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("has_handler", &self.handler.is_some())
            .field("has_cleanup", &self.cleanup.is_some())
            .field("retry", &self.retry)
            .field("cancel", &self.cancel)
            .finish()
    }
}

/// A validated job as it travels through the intake queue
pub(crate) struct QueuedJob<P> {
    pub(crate) id: JobId,
    pub(crate) payload: P,
    pub(crate) handler: JobHandler<P>,
    pub(crate) retry: Option<RetryPolicy>,
    pub(crate) cancel: CancelSignal,
    pub(crate) completion: Completion,
}
