use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::PipelineConfig;
use crate::error::{Result, TenderError};

/// Bounded-attempt exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first one.
    pub max_attempts: u32,
    /// Backoff multiplier: the delay after the first failure.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Scale each delay by a random factor in 0.8..1.2.
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            max_attempts: config.max_retries,
            base_delay: delay_secs("retry_delay_secs", config.retry_delay_secs)?,
            max_delay: delay_secs("max_retry_delay_secs", config.max_retry_delay_secs)?,
            jitter: config.retry_jitter,
        })
    }

    /// A policy that never sleeps; used by tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Delay to wait after the `failed_attempt`-th failure (1-based).
    ///
    /// `base × 2^(failed_attempt - 1)`, capped at `max_delay`.
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(62) as i32;
        let secs = (self.base_delay.as_secs_f64() * 2f64.powi(exp))
            .min(self.max_delay.as_secs_f64());
        let secs = if self.jitter {
            secs * (0.8 + rand::random::<f64>() * 0.4)
        } else {
            secs
        };
        Duration::from_secs_f64(secs)
    }
}

fn delay_secs(field: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| TenderError::Config(format!("pipeline.{} = {}: {}", field, secs, e)))
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are spent. The last error is returned unmodified.
///
/// `op` receives the 1-based attempt number. Sleeping suspends only the
/// calling task.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_if(policy, operation, TenderError::is_retryable, op).await
}

/// Like [`retry`], with a caller-supplied notion of which errors are transient.
pub async fn retry_if<T, F, Fut, C>(
    policy: &RetryPolicy,
    operation: &str,
    classify: C,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    C: Fn(&TenderError) -> bool,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if classify(&e) && attempt < policy.max_attempts => {
                let backoff = policy.backoff(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Retrying after transient failure"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
