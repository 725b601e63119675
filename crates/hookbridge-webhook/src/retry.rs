//! Retry policy for idempotent provider calls

use crate::Result;
use hookbridge_core::WebhookSettings;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Exponential backoff with jitter
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 - 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Retry settings for webhook deletion
    pub fn from_settings(settings: &WebhookSettings) -> Self {
        Self {
            max_attempts: settings.delete_max_attempts.max(1),
            initial_delay: settings.delete_initial_delay(),
            ..Self::default()
        }
    }

    /// Delay to wait after `attempt` failed attempts
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32 - 1);

        let jitter = if self.jitter_factor > 0.0 {
            let range = base_delay * self.jitter_factor;
            (rand::random::<f64>() - 0.5) * 2.0 * range
        } else {
            0.0
        };

        let delay_ms = (base_delay + jitter)
            .max(0.0)
            .min(self.max_delay.as_millis() as f64);
        Duration::from_millis(delay_ms as u64)
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Only errors for which [`crate::WebhookError::is_transient`] holds are retried.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.calculate_delay(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
