//! # Retry / backoff policy
//!
//! Implements the retry semantics of §4.7 for `command` resources:
//! `retries` attempts beyond the first, waiting `retry_delay_seconds`
//! between attempts according to `retry_backoff` (constant/linear/
//! exponential), with up to `retry_jitter_seconds` of random jitter added
//! to each wait.
//!
//! Wraps a closure-returning-a-future in a delay-then-retry loop. This
//! engine only ever retries (an exhausted `command` resource is always a
//! hard failure, never silently ignored), so there is no separate
//! `fail_fast`/`ignore` strategy to dispatch on — just the generic
//! `with_retry(closure)` shape.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::model::{Resource, BACKOFF_EXPONENTIAL, BACKOFF_LINEAR};

/// A resource's retry policy, extracted once and reused across attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_seconds: u64,
    pub backoff: Backoff,
    pub jitter_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Constant,
    Linear,
    Exponential,
}

impl RetryPolicy {
    pub fn from_resource(resource: &Resource) -> Self {
        let backoff = match resource.retry_backoff_kind() {
            BACKOFF_LINEAR => Backoff::Linear,
            BACKOFF_EXPONENTIAL => Backoff::Exponential,
            _ => Backoff::Constant,
        };
        Self {
            max_attempts: resource.retries.max(0) as u32 + 1,
            delay_seconds: resource.retry_delay_seconds.max(0) as u64,
            backoff,
            jitter_seconds: resource.retry_jitter_seconds,
        }
    }

    /// The wait before attempt number `attempt` (1-indexed, counting the
    /// attempt about to run), excluding jitter.
    fn base_delay(&self, attempt: u32) -> u64 {
        match self.backoff {
            Backoff::Constant => self.delay_seconds,
            Backoff::Linear => self.delay_seconds.saturating_mul(attempt as u64),
            Backoff::Exponential => {
                self.delay_seconds.saturating_mul(1u64 << attempt.saturating_sub(1).min(32))
            }
        }
    }

    fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = if self.jitter_seconds > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_seconds)
        } else {
            0
        };
        Duration::from_secs(base + jitter)
    }
}

/// Runs `operation` up to `policy.max_attempts` times, sleeping between
/// failed attempts per the configured backoff. Returns the last error if
/// every attempt fails.
pub async fn with_retry<T, E, F, Fut>(
    resource_id: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_attempts {
                    return Err(err);
                }
                let wait = policy.delay_with_jitter(attempt);
                warn!(
                    resource = resource_id,
                    attempt,
                    max_attempts = policy.max_attempts,
                    wait_secs = wait.as_secs(),
                    error = %err,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn resource_with_retries(retries: i64) -> Resource {
        Resource {
            retries,
            retry_delay_seconds: 0,
            ..Default::default()
        }
    }

    #[test]
    fn max_attempts_is_retries_plus_one() {
        let policy = RetryPolicy::from_resource(&resource_with_retries(2));
        assert_eq!(policy.max_attempts, 3);
    }

    #[test]
    fn exponential_backoff_doubles_each_attempt() {
        let resource = Resource {
            retries: 5,
            retry_delay_seconds: 1,
            retry_backoff: BACKOFF_EXPONENTIAL.to_string(),
            ..Default::default()
        };
        let policy = RetryPolicy::from_resource(&resource);
        assert_eq!(policy.base_delay(1), 1);
        assert_eq!(policy.base_delay(2), 2);
        assert_eq!(policy.base_delay(3), 4);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::from_resource(&resource_with_retries(3));
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<i32, &str> = with_retry("r1", policy, || {
            let attempts = attempts_clone.clone();
            async move {
                let current = attempts.fetch_add(1, Ordering::SeqCst);
                if current < 2 {
                    Err("transient")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_all_attempts_and_returns_last_error() {
        let policy = RetryPolicy::from_resource(&resource_with_retries(2));
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<i32, &str> = with_retry("r1", policy, || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err("persistent")
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_retries_attempts_exactly_once() {
        let policy = RetryPolicy::from_resource(&resource_with_retries(0));
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let _: Result<i32, &str> = with_retry("r1", policy, || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err("fail")
            }
        })
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
