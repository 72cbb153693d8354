//! Per-job cancellation signal

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation and deadline signal carried by a job
///
/// A signal is triggered when it is cancelled explicitly (through any clone or
/// the underlying token) or when its deadline passes. Workers check it before
/// every attempt, race it against running attempts, and use it to interrupt
/// backoff waits.
///
/// # Example
///
/// ```ignore
/// let signal = CancelSignal::new().with_timeout(Duration::from_secs(30));
/// let job = Job::new(payload).with_handler(handler).with_cancel(signal.clone());
///
/// // Later, from anywhere:
/// signal.cancel();
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CancelSignal {
    /// Create a fresh, untriggered signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token, e.g. one shared with other parts of the application
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Trigger automatically at `deadline`
    ///
    /// An earlier existing deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Trigger automatically after `timeout` from now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// A signal cancelled whenever this one is, but which can be cancelled on its own
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel the job
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The underlying token
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check whether cancellation was requested or the deadline passed
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolve once the signal is triggered
    ///
    /// Never resolves for a signal without deadline that is never cancelled.
    pub async fn triggered(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Wait for `timeout`, returning early if the signal triggers
    ///
    /// Returns `true` if the signal triggered (before or during the wait).
    pub async fn wait_or_timeout(&self, timeout: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }

        tokio::select! {
            biased;
            _ = self.triggered() => true,
            _ = tokio::time::sleep(timeout) => self.is_triggered(),
        }
    }
}

impl From<CancellationToken> for CancelSignal {
    fn from(token: CancellationToken) -> Self {
        Self::from_token(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_signal_untriggered() {
        let signal = CancelSignal::new();
        assert!(!signal.is_triggered());
        assert!(signal.deadline().is_none());
    }

    #[test]
    fn test_cancel_visible_through_clones() {
        let signal = CancelSignal::new();
        let clone = signal.clone();

        clone.cancel();

        assert!(signal.is_triggered());
    }

    #[test]
    fn test_child_follows_parent_only() {
        let parent = CancelSignal::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_triggered());
        assert!(!parent.is_triggered());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_triggered());
    }

    #[test]
    fn test_from_token() {
        let token = CancellationToken::new();
        let signal = CancelSignal::from(token.clone());

        token.cancel();
        assert!(signal.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_triggers() {
        let signal = CancelSignal::new().with_timeout(Duration::from_secs(5));
        assert!(!signal.is_triggered());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(signal.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_deadline_wins() {
        let signal = CancelSignal::new()
            .with_timeout(Duration::from_secs(5))
            .with_timeout(Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(signal.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let signal = CancelSignal::new();
        let start = Instant::now();

        let triggered = signal.wait_or_timeout(Duration::from_secs(3)).await;

        assert!(!triggered);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_interrupted_by_cancel() {
        let signal = CancelSignal::new();
        let canceller = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let triggered = signal.wait_or_timeout(Duration::from_secs(60)).await;

        assert!(triggered);
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_interrupted_by_deadline() {
        let signal = CancelSignal::new().with_timeout(Duration::from_secs(2));

        let triggered = signal.wait_or_timeout(Duration::from_secs(60)).await;

        assert!(triggered);
    }
}
