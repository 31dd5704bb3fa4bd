//! Retry of optimistic read-modify-write operations.

use std::future::Future;
use std::time::Duration;

use crate::error::DomainError;

/// Errors that can tell a lost concurrency race apart from a real failure.
pub trait ConflictAware {
    fn is_conflict(&self) -> bool;
}

impl ConflictAware for DomainError {
    fn is_conflict(&self) -> bool {
        DomainError::is_conflict(self)
    }
}

/// How often, and how patiently, a conflicting operation is retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::with_max_attempts(1)
    }

    /// Backoff before retry number `retry` (1-based), doubling up to the cap.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Runs `operation` until it succeeds, fails with a non-conflict error, or
/// the policy's attempts are used up.
///
/// The closure must redo the whole read-modify-write: reload the aggregate,
/// decide again, commit again.
pub async fn retry_on_conflict<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    E: ConflictAware + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Err(err) if err.is_conflict() && attempt < policy.max_attempts => {
                metrics::counter!("command_conflict_retries_total").increment(1);
                tracing::debug!(attempt, error = %err, "concurrency conflict, retrying");
                tokio::time::sleep(policy.backoff_for(attempt)).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Conflict,
        Fatal,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl ConflictAware for TestError {
        fn is_conflict(&self) -> bool {
            matches!(self, TestError::Conflict)
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_millis(5));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(10));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(20));
        assert_eq!(policy.backoff_for(10), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn retries_conflicts_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, TestError> = retry_on_conflict(&fast_policy(5), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 { Err(TestError::Conflict) } else { Ok(n) }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TestError> = retry_on_conflict(&fast_policy(3), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Conflict)
        })
        .await;

        assert!(matches!(result, Err(TestError::Conflict)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_other_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TestError> = retry_on_conflict(&fast_policy(5), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Fatal)
        })
        .await;

        assert!(matches!(result, Err(TestError::Fatal)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
