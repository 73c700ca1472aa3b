//! Last-commit clock and the quiet-window wait

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuietOutcome {
    /// A full window elapsed with no commit
    Quiet,
    /// Commits kept arriving until the maximum wait ran out
    MaxWaitElapsed,
    Cancelled,
}

/// Monotonic time of a session's most recent commit. Clones share the same
/// clock; each commit re-arms any pending quiet wait on it.
#[derive(Debug, Clone)]
pub struct CommitClock {
    tx: Arc<watch::Sender<Instant>>,
}

impl CommitClock {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Instant::now());
        Self { tx: Arc::new(tx) }
    }

    /// Record a commit now. Never moves the clock backwards.
    pub fn touch(&self) {
        let now = Instant::now();
        self.tx.send_modify(|last| {
            if now > *last {
                *last = now;
            }
        });
    }

    pub fn last_commit(&self) -> Instant {
        *self.tx.borrow()
    }

    /// Resolve once `window` has passed since the last commit.
    ///
    /// A single deadline timer is armed at `last_commit + window`; a commit
    /// during the wait moves the deadline. The whole wait is capped at
    /// `max_wait` and ends early when `cancel` fires.
    pub async fn wait_quiet(
        &self,
        window: Duration,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> QuietOutcome {
        let mut rx = self.tx.subscribe();
        let hard_deadline = Instant::now() + max_wait;
        loop {
            let deadline = *rx.borrow_and_update() + window;
            if Instant::now() >= deadline {
                return QuietOutcome::Quiet;
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => return QuietOutcome::Cancelled,
                () = tokio::time::sleep_until(hard_deadline) => return QuietOutcome::MaxWaitElapsed,
                () = tokio::time::sleep_until(deadline) => {}
                changed = rx.changed() => {
                    if changed.is_err() {
                        return QuietOutcome::Quiet;
                    }
                }
            }
        }
    }
}

impl Default for CommitClock {
    fn default() -> Self {
        Self::new()
    }
}
