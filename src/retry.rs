use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Capped exponential backoff parameters shared by every retrying call site.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base: Duration, cap: Duration) -> Self {
        Self {
            max_attempts,
            base,
            cap,
        }
    }

    /// Aggregator quote calls: 3 attempts, 500 ms base, 4 s cap.
    pub const fn quote() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(4))
    }

    /// Exit re-queue: up to 5 retries, 1 s base, 30 s cap.
    pub const fn exit_requeue() -> Self {
        Self::new(5, Duration::from_secs(1), Duration::from_secs(30))
    }

    /// Delay before retry number `attempt` (1-based): base × 2^(attempt−1),
    /// capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Retry `op` while `retriable` holds, sleeping per the policy between
/// attempts. The operation receives the 1-based attempt number.
pub async fn retry_async<T, E, F, Fut, P>(
    policy: RetryPolicy,
    mut op: F,
    mut retriable: P,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.max_attempts && retriable(&e) => {
                sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_delay_doubles_and_caps() {
        let p = RetryPolicy::new(5, Duration::from_millis(500), Duration::from_secs(4));
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(2), Duration::from_secs(1));
        assert_eq!(p.delay_for(3), Duration::from_secs(2));
        assert_eq!(p.delay_for(4), Duration::from_secs(4));
        assert_eq!(p.delay_for(5), Duration::from_secs(4)); // capped
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let counter = AtomicUsize::new(0);
        let policy = RetryPolicy::new(4, Duration::from_millis(1), Duration::from_millis(4));
        let res: Result<u32, &str> = retry_async(
            policy,
            |_| {
                let n = counter.fetch_add(1, Ordering::Relaxed);
                async move {
                    if n < 2 {
                        Err("transient")
                    } else {
                        Ok(7)
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(res.unwrap(), 7);
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_non_retriable_fails_fast() {
        let counter = AtomicUsize::new(0);
        let policy = RetryPolicy::new(4, Duration::from_millis(1), Duration::from_millis(4));
        let res: Result<u32, &str> = retry_async(
            policy,
            |_| {
                counter.fetch_add(1, Ordering::Relaxed);
                async { Err("fatal") }
            },
            |_| false,
        )
        .await;

        assert!(res.is_err());
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_attempt_cap() {
        let counter = AtomicUsize::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(4));
        let res: Result<u32, &str> = retry_async(
            policy,
            |_| {
                counter.fetch_add(1, Ordering::Relaxed);
                async { Err("transient") }
            },
            |_| true,
        )
        .await;

        assert!(res.is_err());
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }
}
