//! Opt-in retry utilities with exponential backoff.
//!
//! The core never retries on its own — rate limits, pool exhaustion,
//! and server errors surface directly so callers stay in control. This
//! module is the sanctioned way to opt back in:
//!
//! ```rust,no_run
//! use agentry::retry::{retry_if_transient, RetryConfig};
//! # use agentry::{Llm, LlmConfig, types::Message};
//! # async fn example(llm: Llm) -> agentry::Result<()> {
//! let config = RetryConfig::default().with_max_attempts(3);
//! let messages = [Message::user("hello")];
//!
//! let response = retry_if_transient(config, || llm.chat(&messages, &[])).await?;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Backoff configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Ceiling on any single delay
    pub max_delay: Duration,

    /// Growth factor per attempt (2.0 doubles the delay each time)
    pub backoff_multiplier: f64,

    /// Random jitter fraction (0.0 to 1.0) to spread thundering herds
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay for the given 0-based attempt, capped and jittered.
    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64;
        let exponential = base * self.backoff_multiplier.powi(attempt as i32);
        let capped = exponential.min(self.max_delay.as_millis() as f64);

        let jitter_range = capped * self.jitter_factor;
        let jitter = rand::random::<f64>() * jitter_range - jitter_range / 2.0;

        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}

/// True for failures worth retrying: transient transport conditions,
/// provider-side overload, and pool pressure. Configuration, schema,
/// and auth failures will not fix themselves.
pub fn is_retryable(error: &Error) -> bool {
    matches!(
        error,
        Error::Timeout
            | Error::Dns(_)
            | Error::Network(_)
            | Error::Backend(_)
            | Error::Stream(_)
            | Error::Server(_)
            | Error::RateLimit(_)
            | Error::PoolExhausted
    )
}

/// Retry an operation with exponential backoff, regardless of the error.
pub async fn retry_with_backoff<F, Fut, T>(config: RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(attempt, error = %e, "attempt failed");
                last_error = Some(e);
                if attempt + 1 < config.max_attempts {
                    sleep(config.delay_for(attempt)).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::backend("retry loop ran zero attempts")))
}

/// Retry with backoff, but give up immediately on non-transient errors.
pub async fn retry_if_transient<F, Fut, T>(config: RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if is_retryable(&e) => {
                debug!(attempt, error = %e, "transient failure");
                last_error = Some(e);
                if attempt + 1 < config.max_attempts {
                    sleep(config.delay_for(attempt)).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| Error::backend("retry loop ran zero attempts")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_config_builders() {
        let config = RetryConfig::new()
            .with_max_attempts(5)
            .with_initial_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(30))
            .with_backoff_multiplier(1.5)
            .with_jitter_factor(2.0); // clamped

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.jitter_factor, 1.0);
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_backoff_multiplier(2.0)
            .with_jitter_factor(0.0);

        assert!(config.delay_for(1) > config.delay_for(0));
        assert!(config.delay_for(2) > config.delay_for(1));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(4))
            .with_jitter_factor(0.0);

        assert_eq!(config.delay_for(10), Duration::from_secs(4));
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&Error::Timeout));
        assert!(is_retryable(&Error::PoolExhausted));
        assert!(is_retryable(&Error::RateLimit("429".to_string())));
        assert!(is_retryable(&Error::Server("500".to_string())));

        assert!(!is_retryable(&Error::invalid_arg("bad config")));
        assert!(!is_retryable(&Error::Auth("401".to_string())));
        assert!(!is_retryable(&Error::SchemaMismatch("missing".to_string())));
        assert!(!is_retryable(&Error::Cancelled));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let config = RetryConfig::new()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(5));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result = retry_if_transient(config, move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(Error::Timeout)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_on_permanent_error() {
        let config = RetryConfig::new()
            .with_max_attempts(5)
            .with_initial_delay(Duration::from_millis(5));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result: Result<()> = retry_if_transient(config, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Auth("401".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(Error::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let config = RetryConfig::new()
            .with_max_attempts(2)
            .with_initial_delay(Duration::from_millis(5));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result: Result<()> = retry_with_backoff(config, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Timeout) }
        })
        .await;

        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
