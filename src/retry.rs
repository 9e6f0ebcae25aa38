//! Bounded fixed-interval retry, shared by every poller.
//!
//! Freshly booted hosts refuse connections for a while, instances take time
//! to reach the running state, and dashboards answer only once the daemon is
//! up. All of those waits use the same shape: a bounded number of attempts
//! with a fixed sleep in between, interruptible between attempts.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

use crate::error::{Error, Result};

/// Fixed-interval retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts before giving up.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub interval: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

/// Cooperative cancellation handle, checked at every retry boundary.
///
/// Cloning shares the underlying flag; the binary wires this to Ctrl-C.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once cancellation is signalled.
    pub async fn cancelled(&self) {
        // Register the waiter before reading the flag; a cancel landing
        // between the two is then guaranteed to wake us.
        let mut notified = std::pin::pin!(self.inner.notify.notified());
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Outcome classification for a single retry attempt.
pub enum Attempt<T> {
    /// The condition holds; stop retrying.
    Ready(T),
    /// The condition does not hold yet; sleep and try again.
    Pending(String),
}

/// Run `op` under `policy`, sleeping `policy.interval` between attempts.
///
/// `Pending` outcomes are retried until the attempt budget is exhausted, at
/// which point `exhausted` builds the terminal error from the attempt count.
/// Hard errors from `op` propagate immediately. Cancellation is honored both
/// before each attempt and during the inter-attempt sleep.
pub async fn retry<T, F, Fut, E>(
    policy: &RetryPolicy,
    cancel: &CancelToken,
    mut op: F,
    exhausted: E,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Attempt<T>>>,
    E: FnOnce(u32) -> Error,
{
    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(Error::Interrupted);
        }

        match op(attempt).await? {
            Attempt::Ready(value) => return Ok(value),
            Attempt::Pending(reason) => {
                debug!(attempt, max = policy.max_attempts, %reason, "attempt pending");
                if attempt < policy.max_attempts {
                    tokio::select! {
                        () = tokio::time::sleep(policy.interval) => {}
                        () = cancel.cancelled() => return Err(Error::Interrupted),
                    }
                }
            }
        }
    }

    Err(exhausted(policy.max_attempts))
}
