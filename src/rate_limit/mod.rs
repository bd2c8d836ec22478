//! Call pacing for quota-limited remote APIs
//!
//! Two independent layers:
//! - [`RateLimitedExecutor`] runs submitted tasks one at a time, in submission
//!   order, and keeps a minimum gap between the end of one task and the start
//!   of the next (the provider's per-minute quota).
//! - [`retry_with_backoff`] re-runs a single operation after exponentially
//!   growing delays while it keeps failing with a rate-limit error (transient
//!   429 bursts).

mod retry;

pub use retry::{RateLimitAware, RetryError, RetryPolicy, retry_with_backoff};

use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Serializing task queue with a fixed inter-call spacing
///
/// Queueing relies on the FIFO fairness of [`tokio::sync::Mutex`]: callers
/// acquire the slot in the order they called [`enqueue`](Self::enqueue).
/// The slot remembers when the previous task settled so the next one starts
/// no earlier than `spacing` after it, whether that task succeeded or failed.
pub struct RateLimitedExecutor {
    spacing: Duration,
    last_settled: Mutex<Option<Instant>>,
}

impl RateLimitedExecutor {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last_settled: Mutex::new(None),
        }
    }

    /// Executor that never waits between tasks but still runs them one at a time
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    /// Run `task` once every previously enqueued task has settled and the
    /// spacing has elapsed, returning its output
    pub async fn enqueue<F, Fut, T>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut slot = self.last_settled.lock().await;

        if let Some(previous) = *slot {
            let ready_at = previous + self.spacing;
            if ready_at > Instant::now() {
                tracing::trace!(
                    "Rate limiter waiting {:?} before next call",
                    ready_at - Instant::now()
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }

        let output = task().await;
        *slot = Some(Instant::now());
        output
    }
}

impl std::fmt::Debug for RateLimitedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedExecutor")
            .field("spacing", &self.spacing)
            .finish()
    }
}
