//! Timeouts and bounded retries for external service calls.
//!
//! Every call a pipeline job makes to an external service is wrapped in
//! [`with_retry`]: the call is cut off after [`RetryPolicy::timeout`] and surfaced as
//! [`RabbitholeError::ServiceTimeout`], and transient failures (see
//! [`ErrorKind::is_transient`]) are repeated with exponential backoff until
//! [`RetryPolicy::max_attempts`] is reached. The final error is returned unchanged so
//! the owning job fails with the real cause.

use crate::config::PipelineSettings;
use crate::error::{RabbitholeError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout and backoff parameters for one external call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&PipelineSettings::default())
    }
}

impl From<&PipelineSettings> for RetryPolicy {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.call_timeout_seconds),
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retry(timeout: Duration) -> Self {
        Self {
            timeout,
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Run `operation` under `policy`, naming the service in logs and timeout errors.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    service: &'static str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let outcome = match tokio::time::timeout(policy.timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(RabbitholeError::ServiceTimeout {
                service,
                timeout: policy.timeout,
            }),
        };

        match outcome {
            Ok(value) => {
                if attempt > 1 {
                    debug!(service, attempt, "Service call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.kind().is_transient() && attempt < policy.max_attempts => {
                let backoff = policy.backoff_for(attempt);
                warn!(
                    service,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "Service call failed, retrying: {}",
                    err
                );
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}
