//! Bounded exponential-backoff retry for a single completion call.
//!
//! Transient failures (rate limiting, timeouts, connection trouble) are
//! retried after `base_delay * 2^attempt`; anything else is returned at once.

use std::future::Future;
use std::time::Duration;

use super::LlmError;

/// Lowercase substrings that mark an error as transient.
const RETRYABLE_KEYWORDS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "ratelimit",
    "429",
    "too many requests",
    "timeout",
    "timed out",
    "connection",
    "connect",
];

/// Retry settings for one call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each later one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay after the failed attempt with 0-based index `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, mut call: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 < attempts && is_retryable(&e.to_string()) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "Completion attempt {}/{} failed: {}; retrying in {:?}",
                        attempt + 1,
                        attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Whether an error message describes a transient failure.
pub fn is_retryable(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_KEYWORDS.iter().any(|k| lower.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        }
    }

    #[test]
    fn classifies_transient_messages() {
        assert!(is_retryable("HTTP 429: Too Many Requests"));
        assert!(is_retryable("Rate limit exceeded"));
        assert!(is_retryable("Request timed out: deadline"));
        assert!(is_retryable("Connection error: refused"));
        assert!(!is_retryable("HTTP 401: invalid api key"));
        assert!(!is_retryable("Invalid response: no choices"));
    }

    #[test]
    fn delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = instant()
            .run(move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(LlmError::Http {
                        status: 429,
                        body: "slow down".into(),
                    })
                } else {
                    Ok("done")
                }
            })
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = instant()
            .run(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(LlmError::Timeout("deadline".into()))
            })
            .await;
        assert!(matches!(result, Err(LlmError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = instant()
            .run(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(LlmError::Http {
                    status: 400,
                    body: "bad request".into(),
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
