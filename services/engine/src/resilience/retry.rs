//! Retry with exponential backoff and jitter
//!
//! Wraps a single outbound call. Only failures that report themselves as
//! retryable (see [`Retryable`]) are retried; everything else is returned
//! on the first attempt without sleeping.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Backoff policy for one outbound call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds
    pub max_delay_ms: u64,
    /// Growth factor applied per attempt
    pub exponential_base: f64,
    /// Randomize each delay uniformly within [0, delay]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 20_000,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

/// Invalid retry policy parameters
#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("max_attempts must be at least 1")]
    NoAttempts,

    #[error("base_delay_ms must be greater than zero")]
    ZeroBaseDelay,

    #[error("max_delay_ms ({max}) must not be below base_delay_ms ({base})")]
    MaxBelowBase { base: u64, max: u64 },

    #[error("exponential_base must be greater than 1 (got {0})")]
    ExponentTooSmall(f64),
}

impl RetryPolicy {
    /// Policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_attempts < 1 {
            return Err(PolicyError::NoAttempts);
        }
        if self.base_delay_ms == 0 {
            return Err(PolicyError::ZeroBaseDelay);
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(PolicyError::MaxBelowBase {
                base: self.base_delay_ms,
                max: self.max_delay_ms,
            });
        }
        if !(self.exponential_base > 1.0) {
            return Err(PolicyError::ExponentTooSmall(self.exponential_base));
        }
        Ok(())
    }

    /// Un-jittered delay after failed attempt `attempt` (1-based):
    /// `min(max_delay, base_delay * exponential_base^(attempt-1))`
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.base_delay_ms as f64 * self.exponential_base.powi(exponent);
        let capped = scaled.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Delay actually slept after failed attempt `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        if !self.jitter || ceiling.is_zero() {
            return ceiling;
        }
        let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
        ceiling.mul_f64(factor)
    }
}

/// One failed attempt, as reported to an observer
#[derive(Debug)]
pub struct RetryAttempt<'a, E> {
    /// 1-based attempt number that just failed
    pub attempt: u32,
    /// Delay before the next attempt; zero when no retry follows
    pub delay: Duration,
    /// Whether another attempt will be made
    pub will_retry: bool,
    pub error: &'a E,
}

/// Telemetry hook; has no influence on control flow
pub type RetryObserver<'o, E> = &'o (dyn Fn(&RetryAttempt<'_, E>) + Send + Sync);

/// Run `op` under `policy`, returning the first success or the last failure.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    observer: Option<RetryObserver<'_, E>>,
    mut op: F,
) -> Result<T, E>
where
    E: Retryable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        let will_retry = attempt < max_attempts && error.is_retryable();
        let delay = if will_retry {
            policy.delay_for(attempt)
        } else {
            Duration::ZERO
        };

        if let Some(observe) = observer {
            observe(&RetryAttempt {
                attempt,
                delay,
                will_retry,
                error: &error,
            });
        }

        if !will_retry {
            return Err(error);
        }

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        Transient(u32),
        Fatal,
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient(_))
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            exponential_base: 2.0,
            jitter: false,
        }
    }

    /// Fails with Transient(n) for the first `failures` calls, then succeeds
    async fn flaky(calls: &AtomicU32, failures: u32) -> Result<&'static str, TestError> {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= failures {
            Err(TestError::Transient(n))
        } else {
            Ok("ok")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_when_attempts_exceed_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&policy(4), None, || flaky(&calls, 3)).await;

        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_failure_when_exhausted() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&policy(3), None, || flaky(&calls, 3)).await;

        assert_eq!(result, Err(TestError::Transient(3)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_immediately_without_sleep() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result: Result<(), TestError> = with_retry(&policy(5), None, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError::Fatal) }
        })
        .await;

        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_sees_each_failed_attempt() {
        let calls = AtomicU32::new(0);
        let seen = Mutex::new(Vec::new());
        let record = |a: &RetryAttempt<'_, TestError>| {
            seen.lock().unwrap().push((a.attempt, a.delay, a.will_retry));
        };
        let observer: RetryObserver<'_, TestError> = &record;

        let result = with_retry(&policy(3), Some(observer), || flaky(&calls, 2)).await;
        assert!(result.is_ok());

        let seen = seen.into_inner().unwrap();
        assert_eq!(
            seen,
            vec![
                (1, Duration::from_millis(100), true),
                (2, Duration::from_millis(200), true),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_follow_backoff_schedule() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let _ = with_retry(&policy(4), None, || flaky(&calls, 10)).await;

        // 100 + 200 + 400 between four attempts
        assert_eq!(start.elapsed(), Duration::from_millis(700));
    }

    #[test]
    fn test_backoff_ceiling_is_capped() {
        let p = policy(10);
        assert_eq!(p.backoff_ceiling(1), Duration::from_millis(100));
        assert_eq!(p.backoff_ceiling(3), Duration::from_millis(400));
        assert_eq!(p.backoff_ceiling(5), Duration::from_millis(1_000));
        assert_eq!(p.backoff_ceiling(40), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jittered_delay_within_bounds() {
        let p = RetryPolicy {
            jitter: true,
            ..policy(10)
        };
        for attempt in 1..8 {
            let ceiling = p.backoff_ceiling(attempt);
            for _ in 0..50 {
                assert!(p.delay_for(attempt) <= ceiling);
            }
        }
    }

    #[test]
    fn test_policy_validation() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert_eq!(
            RetryPolicy { max_attempts: 0, ..policy(1) }.validate(),
            Err(PolicyError::NoAttempts)
        );
        assert_eq!(
            RetryPolicy { base_delay_ms: 0, ..policy(1) }.validate(),
            Err(PolicyError::ZeroBaseDelay)
        );
        assert_eq!(
            RetryPolicy { max_delay_ms: 50, ..policy(1) }.validate(),
            Err(PolicyError::MaxBelowBase { base: 100, max: 50 })
        );
        assert_eq!(
            RetryPolicy { exponential_base: 1.0, ..policy(1) }.validate(),
            Err(PolicyError::ExponentTooSmall(1.0))
        );
    }
}
