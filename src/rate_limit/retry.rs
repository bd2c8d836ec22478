use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Classifies errors that the remote side raised because of a rate limit
pub trait RateLimitAware {
    fn is_rate_limited(&self) -> bool;
}

impl RateLimitAware for crate::error::LlmError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, crate::error::LlmError::RateLimited { .. })
    }
}

impl RateLimitAware for crate::error::VcsError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, crate::error::VcsError::RateLimited { .. })
    }
}

/// Attempts and backoff base for [`retry_with_backoff`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay slept after the failed attempt with zero-based index `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

/// Outcome of an operation that could not be completed
#[derive(Debug)]
pub enum RetryError<E> {
    /// The operation failed with an error that is not worth retrying
    Fatal(E),
    /// Every attempt was rate limited
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    /// The error reported by the final attempt
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Fatal(e) => e,
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Fatal(e) => write!(f, "{}", e),
            RetryError::Exhausted { attempts, last } => write!(
                f,
                "Operation failed after {} attempts. Last error: {}",
                attempts, last
            ),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

impl From<RetryError<crate::error::LlmError>> for crate::error::LlmError {
    fn from(err: RetryError<crate::error::LlmError>) -> Self {
        match err {
            RetryError::Fatal(e) => e,
            RetryError::Exhausted { attempts, last } => {
                crate::error::LlmError::RetriesExhausted {
                    attempts,
                    last: last.to_string(),
                }
            }
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-rate-limit error, or
/// `max_retries` attempts have all been rate limited.
///
/// After the rate-limited attempt `n` (zero based) the call sleeps
/// `base_delay * 2^n`, so three exhausted attempts sleep 1x, 2x and 4x the base.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    E: RateLimitAware + fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    // A zero-attempt policy still runs the operation once
    let max_attempts = policy.max_retries.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_rate_limited() => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    "Rate limit hit. Retrying in {}ms. Attempt {}/{}: {}",
                    delay.as_millis(),
                    attempt + 1,
                    max_attempts,
                    e
                );
                tokio::time::sleep(delay).await;

                attempt += 1;
                if attempt >= max_attempts {
                    return Err(RetryError::Exhausted {
                        attempts: max_attempts,
                        last: e,
                    });
                }
            }
            Err(e) => return Err(RetryError::Fatal(e)),
        }
    }
}
