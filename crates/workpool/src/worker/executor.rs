//! Attempt loop for a single job
//!
//! Runs the handler up to `max_attempts` times, waiting between attempts per
//! the effective retry policy. Cancellation is honored before each attempt,
//! during an attempt, and during backoff waits.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::job::{
    panic_message, CancelSignal, JobHandler, JobId, JobOutcome, JobResult, QueuedJob,
};
use crate::reliability::RetryPolicy;

use super::stats::PoolCounters;

/// Run `job` to a terminal state and fulfil its completion obligations
pub(crate) async fn run_job<P>(
    job: QueuedJob<P>,
    default_retry: &RetryPolicy,
    counters: &PoolCounters,
) where
    P: Clone + Send + 'static,
{
    let QueuedJob {
        id,
        payload,
        handler,
        retry,
        cancel,
        completion,
    } = job;
    let policy = retry.as_ref().unwrap_or(default_retry);

    let (outcome, attempts) = execute(id, payload, &handler, policy, &cancel, counters).await;

    match &outcome {
        JobOutcome::Failed(err) => error!(
            job_id = %id,
            attempts,
            error = %format!("{err:#}"),
            "job failed, retries exhausted"
        ),
        other => debug!(job_id = %id, attempts, outcome = %other.kind(), "job finished"),
    }

    counters.job_finished(outcome.kind());
    completion.complete(outcome, attempts);
}

/// The retry loop; returns the outcome and the number of handler invocations
async fn execute<P>(
    job_id: JobId,
    payload: P,
    handler: &JobHandler<P>,
    policy: &RetryPolicy,
    cancel: &CancelSignal,
    counters: &PoolCounters,
) -> (JobOutcome, u32)
where
    P: Clone + Send + 'static,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 0;

    loop {
        if cancel.is_triggered() {
            return (JobOutcome::Cancelled, attempt);
        }

        attempt += 1;
        counters.attempt_started();

        let result = tokio::select! {
            biased;
            _ = cancel.triggered() => return (JobOutcome::Cancelled, attempt),
            result = invoke(handler, payload.clone()) => result,
        };

        let err = match result {
            Ok(()) => return (JobOutcome::Succeeded, attempt),
            Err(err) => err,
        };

        if attempt >= max_attempts {
            return (JobOutcome::Failed(err), attempt);
        }

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            %job_id,
            attempt,
            max_attempts,
            ?delay,
            error = %format!("{err:#}"),
            "job attempt failed, retrying"
        );

        if cancel.wait_or_timeout(delay).await {
            return (JobOutcome::Cancelled, attempt);
        }
    }
}

/// Call the handler once, turning panics into errors
async fn invoke<P>(handler: &JobHandler<P>, payload: P) -> JobResult {
    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| handler(payload))) {
        Ok(future) => future,
        Err(panic) => return Err(panicked(panic.as_ref())),
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(panicked(panic.as_ref())),
    }
}

fn panicked(payload: &(dyn std::any::Any + Send)) -> anyhow::Error {
    anyhow::anyhow!("job panicked: {}", panic_message(payload))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use futures::future::BoxFuture;
    use tokio::time::Instant;
    use uuid::Uuid;

    use super::*;
    use crate::job::Job;

    fn handler_failing_until(succeed_on: u32, calls: Arc<AtomicU32>) -> JobHandler<()> {
        Arc::new(move |_: ()| {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= succeed_on {
                    Ok(())
                } else {
                    Err(anyhow::anyhow!("attempt {n} failed"))
                }
            }
            .boxed()
        })
    }

    async fn explode(_: ()) -> JobResult {
        panic!("kaboom")
    }

    async fn sleep_forever(_: ()) -> JobResult {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_secs(1), Duration::from_secs(10), 2.0).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let handler = handler_failing_until(u32::MAX, Arc::clone(&calls));
        let counters = PoolCounters::new();

        let (outcome, attempts) = execute(
            Uuid::now_v7(),
            (),
            &handler,
            &policy(4),
            &CancelSignal::new(),
            &counters,
        )
        .await;

        assert_eq!(attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(outcome.error().unwrap().to_string(), "attempt 4 failed");
        assert_eq!(counters.snapshot().attempts, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_between_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let handler = handler_failing_until(3, Arc::clone(&calls));
        let start = Instant::now();

        let (outcome, attempts) = execute(
            Uuid::now_v7(),
            (),
            &handler,
            &policy(3),
            &CancelSignal::new(),
            &PoolCounters::new(),
        )
        .await;

        assert!(outcome.is_success());
        assert_eq!(attempts, 3);
        // 1s after attempt 1, 2s after attempt 2
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let handler = handler_failing_until(1, Arc::clone(&calls));
        let cancel = CancelSignal::new();
        cancel.cancel();

        let (outcome, attempts) = execute(
            Uuid::now_v7(),
            (),
            &handler,
            &policy(3),
            &cancel,
            &PoolCounters::new(),
        )
        .await;

        assert!(matches!(outcome, JobOutcome::Cancelled));
        assert_eq!(attempts, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_running_attempt() {
        let handler: JobHandler<()> = Arc::new(|p: ()| sleep_forever(p).boxed());
        let cancel = CancelSignal::new().with_timeout(Duration::from_secs(5));

        let (outcome, attempts) = execute(
            Uuid::now_v7(),
            (),
            &handler,
            &policy(3),
            &cancel,
            &PoolCounters::new(),
        )
        .await;

        assert!(matches!(outcome, JobOutcome::Cancelled));
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_panic_is_a_failed_attempt() {
        let handler: JobHandler<()> = Arc::new(|p: ()| explode(p).boxed());

        let (outcome, attempts) = execute(
            Uuid::now_v7(),
            (),
            &handler,
            &RetryPolicy::no_retry(),
            &CancelSignal::new(),
            &PoolCounters::new(),
        )
        .await;

        assert_eq!(attempts, 1);
        assert_eq!(outcome.error().unwrap().to_string(), "job panicked: kaboom");
    }

    #[tokio::test]
    async fn test_panic_while_building_future() {
        let handler: JobHandler<()> =
            Arc::new(|_: ()| -> BoxFuture<'static, JobResult> { panic!("eager") });

        let result = invoke(&handler, ()).await;

        assert_eq!(result.unwrap_err().to_string(), "job panicked: eager");
    }

    #[tokio::test]
    async fn test_run_job_uses_override_policy() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut job = Job::new(())
            .with_shared_handler(handler_failing_until(u32::MAX, Arc::clone(&calls)))
            .with_retry(RetryPolicy::no_retry());
        let handle = job.subscribe();
        let counters = PoolCounters::new();
        counters.job_enqueued();
        counters.job_started();

        let Ok(queued) = job.into_parts() else {
            panic!("job has a handler");
        };
        run_job(queued, &policy(5), &counters).await;

        let report = handle.wait().await.unwrap();
        assert_eq!(report.attempts, 1);
        assert!(matches!(report.outcome, JobOutcome::Failed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(counters.snapshot().failed, 1);
    }
}
