//! Bounded exponential backoff around provider calls.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

use crate::config::OrchestrationConfig;
use crate::ports::ProviderError;

/// Retry policy applied by the orchestration engine.
///
/// Every attempt carries its own deadline. The whole loop is bounded by
/// `attempt_timeout * (max_retries + 1)`: backoff sleeps are cut short and
/// no new attempt starts once that budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub attempt_timeout: Duration,
}

/// Why a retried call gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    pub attempts: u32,
    pub error: ProviderError,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, attempt_timeout: Duration) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            attempt_timeout,
        }
    }

    pub fn from_config(config: &OrchestrationConfig) -> Self {
        Self::new(config.max_retries, config.timeout())
            .with_backoff(config.retry_base_delay(), config.retry_max_delay())
    }

    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay.max(base_delay);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Upper bound on the wall-clock time of [`run`](Self::run).
    pub fn overall_deadline(&self) -> Duration {
        self.attempt_timeout.saturating_mul(self.max_attempts())
    }

    /// Backoff after the failed attempt numbered `attempt` (0-based).
    ///
    /// A rate limit's retry-after hint raises the delay, still capped at
    /// `max_delay`.
    pub fn delay_for(&self, attempt: u32, error: &ProviderError) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(31)));
        let hinted = match error {
            ProviderError::RateLimited { retry_after_secs } => {
                exponential.max(Duration::from_secs(u64::from(*retry_after_secs)))
            }
            _ => exponential,
        };
        hinted.min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent. `on_failure` sees every failed attempt.
    ///
    /// Returns the value and the number of attempts made.
    pub async fn run<T, F, Fut>(
        &self,
        op: F,
        on_failure: impl FnMut(u32, &ProviderError),
    ) -> Result<(T, u32), RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.run_until(Instant::now() + self.overall_deadline(), op, on_failure)
            .await
    }

    /// [`run`](Self::run) against a deadline shared with other calls.
    pub async fn run_until<T, F, Fut>(
        &self,
        deadline: Instant,
        mut op: F,
        mut on_failure: impl FnMut(u32, &ProviderError),
    ) -> Result<(T, u32), RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0u32;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let budget = self.attempt_timeout.min(remaining);
            let result = match timeout(budget, op(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::timeout(budget)),
            };
            let attempts = attempt + 1;

            let error = match result {
                Ok(value) => return Ok((value, attempts)),
                Err(error) => error,
            };
            on_failure(attempt, &error);

            if !error.is_retryable() || attempts >= self.max_attempts() {
                return Err(RetryFailure { attempts, error });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::warn!(attempts, "Retry deadline reached");
                return Err(RetryFailure { attempts, error });
            }

            let delay = self.delay_for(attempt, &error).min(remaining);
            tracing::debug!(
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying provider call"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }

    /// A single attempt under the per-attempt deadline.
    pub async fn once<T, Fut>(&self, fut: Fut) -> Result<T, ProviderError>
    where
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.once_until(Instant::now() + self.attempt_timeout, fut)
            .await
    }

    /// A single attempt under the per-attempt deadline, cut short by
    /// `deadline`.
    pub async fn once_until<T, Fut>(&self, deadline: Instant, fut: Fut) -> Result<T, ProviderError>
    where
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let budget = self
            .attempt_timeout
            .min(deadline.saturating_duration_since(Instant::now()));
        if budget.is_zero() {
            return Err(ProviderError::timeout(budget));
        }
        timeout(budget, fut)
            .await
            .unwrap_or_else(|_| Err(ProviderError::timeout(budget)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(200))
            .with_backoff(Duration::from_millis(1), Duration::from_millis(5))
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_secs(30))
            .with_backoff(Duration::from_millis(100), Duration::from_millis(500));
        let err = ProviderError::network("x");
        assert_eq!(policy.delay_for(0, &err), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1, &err), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2, &err), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3, &err), Duration::from_millis(500));
        assert_eq!(policy.delay_for(40, &err), Duration::from_millis(500));
    }

    #[test]
    fn rate_limit_hint_raises_delay_up_to_cap() {
        let policy = RetryPolicy::new(3, Duration::from_secs(30))
            .with_backoff(Duration::from_millis(100), Duration::from_secs(2));
        assert_eq!(
            policy.delay_for(0, &ProviderError::rate_limited(1)),
            Duration::from_secs(1)
        );
        assert_eq!(
            policy.delay_for(0, &ProviderError::rate_limited(30)),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn overall_deadline_covers_every_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(250));
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.overall_deadline(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn retryable_errors_use_the_whole_budget() {
        let calls = AtomicU32::new(0);
        let mut failures = Vec::new();
        let result: Result<((), u32), _> = fast_policy(3)
            .run(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(ProviderError::unavailable("503")) }
                },
                |attempt, _| failures.push(attempt),
            )
            .await;

        let failure = result.unwrap_err();
        assert_eq!(failure.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(failures, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<((), u32), _> = fast_policy(3)
            .run(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(ProviderError::AuthenticationFailed) }
                },
                |_, _| {},
            )
            .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3)
            .run(
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 2 {
                            Err(ProviderError::network("reset"))
                        } else {
                            Ok("done")
                        }
                    }
                },
                |_, _| {},
            )
            .await;

        assert_eq!(result.unwrap(), ("done", 3));
    }

    #[tokio::test]
    async fn slow_attempts_time_out_and_stay_bounded() {
        let policy = fast_policy(2);
        let started = std::time::Instant::now();
        let result: Result<((), u32), _> = policy
            .run(
                |_| async {
                    sleep(Duration::from_secs(10)).await;
                    Ok(())
                },
                |_, _| {},
            )
            .await;

        let failure = result.unwrap_err();
        assert!(matches!(failure.error, ProviderError::Timeout { .. }));
        assert!(failure.attempts <= 3);
        assert!(started.elapsed() < policy.overall_deadline() + Duration::from_millis(200));
    }

    #[tokio::test]
    async fn single_attempt_respects_shared_deadline() {
        let policy = fast_policy(0);
        let deadline = Instant::now() + Duration::from_millis(50);
        let started = std::time::Instant::now();

        let result: Result<(), _> = policy
            .once_until(deadline, async {
                sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_millis(150));

        let spent: Result<(), _> = policy.once_until(deadline, async { Ok(()) }).await;
        assert!(spent.is_err());
    }
}
