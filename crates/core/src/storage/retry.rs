use crate::error::StoreError;
use std::future::Future;
use std::time::Duration;

/// Bounded exponential backoff for storage contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(75),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1), capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Runs `op`, retrying only `StoreError::Contention` until the policy is exhausted.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &'static str,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Err(StoreError::Contention(detail)) if attempt < policy.max_attempts => {
                let backoff = policy.delay_for_attempt(attempt);
                tracing::warn!(op = op_name, attempt, ?backoff, %detail, "storage contention; retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(StoreError::Contention(detail)) => {
                tracing::error!(op = op_name, attempt, %detail, "storage contention; retries exhausted");
                return Err(StoreError::Contention(detail));
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn delay_doubles_and_caps() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(75));
        assert_eq!(p.delay_for_attempt(2), Duration::from_millis(150));
        assert_eq!(p.delay_for_attempt(3), Duration::from_millis(300));
        assert_eq!(p.delay_for_attempt(40), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn retries_contention_then_succeeds() {
        let calls = AtomicU32::new(0);
        let out = with_retry(&fast(), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StoreError::Contention("40001".into()))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();

        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = with_retry(&fast(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Contention("40P01".into()))
        })
        .await;

        assert!(matches!(res, Err(StoreError::Contention(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn does_not_retry_other_errors() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = with_retry(&fast(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Other(anyhow::anyhow!("constraint")))
        })
        .await;

        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
