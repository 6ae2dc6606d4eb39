//! Retry policy for remote calls.

use edgeward_core::{EdgeError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Retry configuration for failed remote calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first call
    pub max_retries: u32,

    /// Initial backoff in milliseconds
    pub initial_backoff_ms: u64,

    /// Maximum backoff in milliseconds
    pub max_backoff_ms: u64,

    /// Whether to retry on rate limit errors
    pub retry_on_rate_limit: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            retry_on_rate_limit: true,
        }
    }

    /// Set maximum retries
    #[must_use]
    pub const fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Set initial backoff
    #[must_use]
    pub const fn initial_backoff(mut self, duration: Duration) -> Self {
        self.initial_backoff_ms = duration.as_millis() as u64;
        self
    }

    /// Set maximum backoff
    #[must_use]
    pub const fn max_backoff(mut self, duration: Duration) -> Self {
        self.max_backoff_ms = duration.as_millis() as u64;
        self
    }

    /// Calculate backoff for a given attempt
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let backoff = self.initial_backoff_ms.saturating_mul(factor);
        Duration::from_millis(backoff.min(self.max_backoff_ms))
    }
}

/// What to do with a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Transient failure, try again after a backoff
    Retry,
    /// The remote rejected the change as inconsistent, the caller repairs
    Conflict,
    /// Give up immediately
    Fatal,
}

/// Default classification of remote failures
#[must_use]
pub const fn classify(err: &EdgeError) -> Disposition {
    if err.is_conflict() {
        Disposition::Conflict
    } else if err.is_retryable() {
        Disposition::Retry
    } else {
        Disposition::Fatal
    }
}

/// Retries remote calls with exponential backoff
#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    classify: fn(&EdgeError) -> Disposition,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Create a policy using the default classification
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            classify,
        }
    }

    /// Replace the failure classification
    #[must_use]
    pub fn with_classifier(mut self, classify: fn(&EdgeError) -> Disposition) -> Self {
        self.classify = classify;
        self
    }

    /// The retry configuration
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay before the next attempt, honouring a server-provided hint
    fn delay_for(&self, attempt: u32, err: &EdgeError) -> Duration {
        let backoff = self.config.backoff_for(attempt);
        match err {
            EdgeError::RateLimited {
                retry_after: Some(secs),
            } => backoff
                .max(Duration::from_secs(*secs))
                .min(Duration::from_millis(self.config.max_backoff_ms)),
            _ => backoff,
        }
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or
    /// the attempt ceiling is reached.
    ///
    /// Conflicts and fatal errors are returned unchanged. Exhausting the
    /// retries yields [`EdgeError::RetriesExhausted`].
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let rate_limited = matches!(err, EdgeError::RateLimited { .. });
            if (self.classify)(&err) != Disposition::Retry
                || (rate_limited && !self.config.retry_on_rate_limit)
            {
                return Err(err);
            }

            if attempt >= self.config.max_retries {
                error!(operation, attempts = attempt + 1, error = %err, "giving up");
                return Err(EdgeError::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: attempt + 1,
                    source: Box::new(err),
                });
            }

            let delay = self.delay_for(attempt, &err);
            warn!(
                operation,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(
            RetryConfig::new()
                .max_retries(max_retries)
                .initial_backoff(Duration::ZERO),
        )
    }

    fn unavailable() -> EdgeError {
        EdgeError::Api {
            code: 503,
            message: "unavailable".into(),
        }
    }

    #[test]
    fn test_backoff_curve() {
        let config = RetryConfig::default();
        assert_eq!(config.backoff_for(0), Duration::from_millis(500));
        assert_eq!(config.backoff_for(1), Duration::from_millis(1000));
        assert_eq!(config.backoff_for(3), Duration::from_millis(4000));
        assert_eq!(config.backoff_for(10), Duration::from_secs(30));
        assert_eq!(config.backoff_for(200), Duration::from_secs(30));
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            classify(&EdgeError::Conflict {
                code: 400,
                message: String::new()
            }),
            Disposition::Conflict
        );
        assert_eq!(classify(&unavailable()), Disposition::Retry);
        assert_eq!(classify(&EdgeError::Unauthorized), Disposition::Fatal);
    }

    #[test]
    fn test_rate_limit_hint_is_capped() {
        let policy = RetryPolicy::new(RetryConfig::new().max_backoff(Duration::from_secs(10)));
        let err = EdgeError::RateLimited {
            retry_after: Some(60),
        };
        assert_eq!(policy.delay_for(0, &err), Duration::from_secs(10));

        let err = EdgeError::RateLimited {
            retry_after: Some(2),
        };
        assert_eq!(policy.delay_for(0, &err), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let calls = &AtomicU32::new(0);
        let result = instant(3)
            .run("flaky", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(unavailable())
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(tokio_test::assert_ok!(result), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_is_surfaced() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = instant(2)
            .run("always down", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(unavailable())
            })
            .await;

        match result {
            Err(EdgeError::RetriesExhausted {
                operation,
                attempts,
                source,
            }) => {
                assert_eq!(operation, "always down");
                assert_eq!(attempts, 3);
                assert_eq!(source.status_code(), Some(503));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_conflict_is_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = instant(5)
            .run("push", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EdgeError::Conflict {
                    code: 400,
                    message: "duplicate".into(),
                })
            })
            .await;

        assert!(tokio_test::assert_err!(result).is_conflict());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_retry_can_be_disabled() {
        let policy = RetryPolicy::new(RetryConfig {
            retry_on_rate_limit: false,
            initial_backoff_ms: 0,
            ..RetryConfig::default()
        });
        let calls = &AtomicU32::new(0);
        let result: Result<()> = policy
            .run("limited", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EdgeError::RateLimited { retry_after: None })
            })
            .await;

        assert!(matches!(result, Err(EdgeError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_custom_classifier() {
        let policy = instant(3).with_classifier(|_| Disposition::Fatal);
        let calls = &AtomicU32::new(0);
        let result: Result<()> = policy
            .run("fatal", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(unavailable())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
