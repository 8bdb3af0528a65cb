//! Wait/notify coordination.
//!
//! A proxy instance owns one `Notifier`. Every request that matches at least
//! one interaction fires it once, waking every task currently blocked in
//! `wait`/`wait_unless`. Waiters that start after a broadcast do not see it.
//!
//! `retry_for` bounds the whole wait: it re-checks a predicate after each
//! wake-up or poll interval until the overall timeout elapses.

use std::future::Future;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Broadcast wake-up signal.
#[derive(Debug, Default)]
pub struct Notifier {
    notify: Notify,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release every currently blocked waiter once.
    pub fn notify(&self) {
        self.notify.notify_waiters();
    }

    /// Block until the next broadcast or `timeout`. Returns whether a
    /// broadcast arrived.
    pub async fn wait(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.notify.notified())
            .await
            .is_ok()
    }

    /// Check `done`, and block for up to `timeout` only if it is false.
    ///
    /// The listener is registered before `done` runs, so a broadcast fired
    /// between the check and the wait still wakes this call.
    pub async fn wait_unless<F>(&self, timeout: Duration, done: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if done() {
            return true;
        }
        let _ = tokio::time::timeout(timeout, notified).await;
        false
    }
}

/// Poll interval and overall ceiling for blocking waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// Same interval, with the ceiling lowered to `timeout` if smaller.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            interval: self.interval,
            timeout: timeout.min(self.timeout),
        }
    }
}

/// Repeatedly evaluate `predicate` until it succeeds or `policy.timeout`
/// elapses.
///
/// The predicate receives the time it may block for (never more than the
/// poll interval) and is expected to block itself, typically on
/// `Notifier::wait_unless`, before reporting failure.
pub async fn retry_for<F, Fut>(policy: RetryPolicy, mut predicate: F) -> bool
where
    F: FnMut(Duration) -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + policy.timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if predicate(remaining.min(policy.interval)).await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
    }
}
