//! Bounded exponential-backoff retry around transport calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::relay::state::RuntimeState;
use crate::relay::transport::TransportError;

/// How many times to try a call and how long to wait in between.
///
/// The wait doubles after every failed attempt, starting at `base_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Backoff after the given failed attempt (1-based): `base * 2^(attempt-1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(5))
    }
}

/// Every attempt of a transport call failed.
#[derive(Debug, Error)]
#[error("{operation} failed after {attempts} attempt(s): {source}")]
pub struct TransportExhausted {
    pub operation: &'static str,
    pub attempts: u32,
    #[source]
    pub source: TransportError,
}

/// Runs transport calls under a [`RetryPolicy`] and reports liveness.
///
/// A successful call refreshes `RuntimeState::last_activity`, which is what
/// the health monitor watches.
pub struct RetryingInvoker {
    policy: RetryPolicy,
    state: Arc<RuntimeState>,
}

impl RetryingInvoker {
    pub fn new(policy: RetryPolicy, state: Arc<RuntimeState>) -> Self {
        Self { policy, state }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Call `op` until it succeeds or the policy runs out of attempts.
    ///
    /// Backoff sleeps only suspend the calling task.
    pub async fn invoke<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T, TransportExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 1;

        loop {
            debug!(operation, attempt, max_attempts, "transport call");

            match op().await {
                Ok(value) => {
                    self.state.touch();
                    return Ok(value);
                }
                Err(e) if attempt >= max_attempts => {
                    error!(operation, attempts = attempt, error = %e, "giving up on transport call");
                    return Err(TransportExhausted {
                        operation,
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_secs = delay.as_secs_f64(),
                        error = %e,
                        "retrying transport call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn invoker(max_attempts: u32, base_secs: u64) -> (RetryingInvoker, Arc<RuntimeState>) {
        let state = Arc::new(RuntimeState::default());
        let policy = RetryPolicy::new(max_attempts, Duration::from_secs(base_secs));
        (RetryingInvoker::new(policy, state.clone()), state)
    }

    #[test]
    fn test_backoff_schedule_doubles() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..=4).map(|a| policy.delay_after(a).as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40]);
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_call_is_bounded() {
        let (invoker, _) = invoker(5, 5);
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), _> = invoker
            .invoke("forward_message", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TransportError::Network("down".into())) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(err.attempts, 5);
        assert_eq!(err.operation, "forward_message");
        assert!(matches!(err.source, TransportError::Network(_)));
        // 5 + 10 + 20 + 40
        assert_eq!(start.elapsed(), Duration::from_secs(75));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_two_failures() {
        let (invoker, state) = invoker(5, 5);
        let calls = AtomicU32::new(0);
        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(state.idle_for(), Duration::from_secs(600));

        let result = invoker
            .invoke("get_me", || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n <= 2 {
                        Err(TransportError::Api("Bad Gateway".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(state.idle_for(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_makes_single_call_without_sleeping() {
        let (invoker, _) = invoker(5, 5);
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = invoker
            .invoke("send_message", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, TransportError>(42) }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_refresh_activity() {
        let (invoker, state) = invoker(2, 1);
        tokio::time::advance(Duration::from_secs(30)).await;

        let result: Result<(), _> = invoker
            .invoke("get_chat", || async { Err(TransportError::Network("timeout".into())) })
            .await;

        assert!(result.is_err());
        // 30s idle before + 1s backoff
        assert_eq!(state.idle_for(), Duration::from_secs(31));
    }
}
