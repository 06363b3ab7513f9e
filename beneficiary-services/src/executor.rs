//! Deadline + bounded retry wrapper for flaky upstream calls
//!
//! The executor knows nothing about what an operation does, only how long it
//! may take and what shape its error has. Exhausting retries yields `None`,
//! so callers treat "no answer" and "explicit failure" the same way.

use std::future::Future;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use beneficiary_core::BeneficiaryError;
use regex::Regex;
use tracing::{debug, warn};

static TRANSIENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(timed? ?out|timeout|connection (reset|refused|closed|aborted)|broken pipe|rate.?limit|too many requests|\b429\b|\b5\d\d\b|dns|name resolution|temporar|unavailable|overloaded|bad gateway)",
    )
    .expect("Invalid transient error regex")
});

/// Whether an error is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
}

/// Classify by variant first, then by message pattern
pub fn classify_error(error: &BeneficiaryError) -> ErrorClass {
    match error {
        BeneficiaryError::Timeout { .. }
        | BeneficiaryError::Network(_)
        | BeneficiaryError::RateLimited(_) => ErrorClass::Transient,
        BeneficiaryError::Auth(_)
        | BeneficiaryError::Config(_)
        | BeneficiaryError::Parse(_)
        | BeneficiaryError::NotFound(_) => ErrorClass::Permanent,
        BeneficiaryError::Api(msg)
        | BeneficiaryError::Storage(msg)
        | BeneficiaryError::Internal(msg) => {
            if TRANSIENT_RE.is_match(msg) {
                ErrorClass::Transient
            } else {
                ErrorClass::Permanent
            }
        }
    }
}

/// Timing and retry parameters for one call site
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    /// Additional attempts after the first
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Delay after failed attempt `attempt` (1-based): base * mult^(attempt-1)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let multiplier = self.backoff_multiplier.max(1.0).powi(exponent);
        let millis = self.base_delay.as_millis() as f64 * multiplier;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// What happened across all attempts of one call
#[derive(Debug)]
pub struct ExecutionReport<T> {
    pub value: Option<T>,
    pub attempts: u32,
    pub last_error: Option<BeneficiaryError>,
    pub elapsed: Duration,
}

impl<T> ExecutionReport<T> {
    pub fn succeeded(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryTimeoutExecutor {
    policy: RetryPolicy,
}

impl RetryTimeoutExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn execute<T, F, Fut>(&self, operation: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BeneficiaryError>>,
    {
        self.execute_with_report(operation).await.value
    }

    /// Run `operation` under the policy and report every attempt's outcome
    pub async fn execute_with_report<T, F, Fut>(&self, mut operation: F) -> ExecutionReport<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BeneficiaryError>>,
    {
        let started = Instant::now();
        let timeout_ms = self.policy.timeout.as_millis() as u64;
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < self.policy.max_attempts() {
            attempts += 1;

            let error = match tokio::time::timeout(self.policy.timeout, operation()).await {
                Ok(Ok(value)) => {
                    debug!(attempts, "Operation succeeded");
                    return ExecutionReport {
                        value: Some(value),
                        attempts,
                        last_error,
                        elapsed: started.elapsed(),
                    };
                }
                Ok(Err(e)) => e,
                Err(_) => BeneficiaryError::timeout(timeout_ms),
            };

            let class = classify_error(&error);
            let retries_left = attempts < self.policy.max_attempts();
            warn!(attempt = attempts, ?class, "Operation failed: {}", error);
            last_error = Some(error);

            if class == ErrorClass::Permanent || !retries_left {
                break;
            }

            let delay = self.policy.delay_for(attempts);
            debug!(?delay, "Backing off before retry");
            tokio::time::sleep(delay).await;
        }

        ExecutionReport {
            value: None,
            attempts,
            last_error,
            elapsed: started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_timeout(Duration::from_millis(50))
            .with_max_retries(max_retries)
            .with_base_delay(Duration::from_millis(1))
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify_error(&BeneficiaryError::timeout(10)), ErrorClass::Transient);
        assert_eq!(classify_error(&BeneficiaryError::network("reset")), ErrorClass::Transient);
        assert_eq!(
            classify_error(&BeneficiaryError::from_status(503, "busy")),
            ErrorClass::Transient
        );
        assert_eq!(
            classify_error(&BeneficiaryError::from_status(429, "")),
            ErrorClass::Transient
        );
        assert_eq!(
            classify_error(&BeneficiaryError::from_status(401, "")),
            ErrorClass::Permanent
        );
        assert_eq!(
            classify_error(&BeneficiaryError::api("HTTP 400: malformed request")),
            ErrorClass::Permanent
        );
        assert_eq!(
            classify_error(&BeneficiaryError::internal("connection reset by peer")),
            ErrorClass::Transient
        );
    }

    #[test]
    fn test_backoff_delays() {
        let policy = RetryPolicy::default()
            .with_base_delay(Duration::from_millis(100))
            .with_backoff_multiplier(3.0);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(300));
        assert_eq!(policy.delay_for(3), Duration::from_millis(900));
        assert_eq!(policy.delay_for(10), policy.max_delay);
    }

    #[tokio::test]
    async fn test_transient_errors_retry_at_most_max_retries() {
        let calls = AtomicU32::new(0);
        let executor = RetryTimeoutExecutor::new(fast_policy(2));

        let report = executor
            .execute_with_report(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(BeneficiaryError::network("connection reset")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.attempts, 3);
        assert!(report.value.is_none());
        assert!(matches!(report.last_error, Some(BeneficiaryError::Network(_))));
    }

    #[tokio::test]
    async fn test_permanent_error_stops_after_one_attempt() {
        let calls = AtomicU32::new(0);
        let executor = RetryTimeoutExecutor::new(fast_policy(2));

        let value = executor
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(BeneficiaryError::auth("bad key")) }
            })
            .await;

        assert!(value.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_retried_then_recovers() {
        let calls = AtomicU32::new(0);
        let executor = RetryTimeoutExecutor::new(fast_policy(2));

        let report = executor
            .execute_with_report(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                    Ok::<_, BeneficiaryError>("owner")
                }
            })
            .await;

        assert_eq!(report.value, Some("owner"));
        assert_eq!(report.attempts, 2);
        assert!(matches!(
            report.last_error,
            Some(BeneficiaryError::Timeout { timeout_ms: 50 })
        ));
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let calls = AtomicU32::new(0);
        let executor = RetryTimeoutExecutor::new(fast_policy(0));
        let _ = executor
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(BeneficiaryError::timeout(1)) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
