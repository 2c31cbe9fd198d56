//! Bounded retry decorator for stages.
//!
//! The runner never retries; a stage that talks to a flaky external service
//! can be wrapped in a [`RetryingStage`] instead, which keeps the runner
//! contract intact: the wrapped stage still produces exactly one result.

use super::Stage;
use crate::context::StageContext;
use crate::core::StageResult;
use crate::errors::StageError;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^retry
    #[default]
    Exponential,
    /// delay = base * (retry + 1)
    Linear,
    /// delay = base
    Constant,
}

/// Jitter strategy to spread out retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter.
    None,
    /// Random from 0 to delay.
    #[default]
    Full,
    /// Half fixed, half random.
    Equal,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts, including the first one.
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff: BackoffStrategy::Exponential,
            jitter: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Delay to wait after the `retry`-th failure (0-based), jitter applied.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay_ms;
        let max = self.max_delay_ms;

        let delay = match self.backoff {
            BackoffStrategy::Exponential => {
                base.saturating_mul(2u64.saturating_pow(retry)).min(max)
            }
            BackoffStrategy::Linear => base.saturating_mul(u64::from(retry) + 1).min(max),
            BackoffStrategy::Constant => base.min(max),
        };

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Wraps a stage and retries it on retryable errors.
///
/// Failed results (`success == false`) and non-retryable errors are
/// returned immediately.
#[derive(Debug)]
pub struct RetryingStage {
    inner: Arc<dyn Stage>,
    config: RetryConfig,
}

impl RetryingStage {
    /// Wraps `inner` with the given retry policy.
    #[must_use]
    pub fn new(inner: Arc<dyn Stage>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[async_trait]
impl Stage for RetryingStage {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageResult, StageError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.inner.execute(&ctx.for_attempt(attempt)).await {
                Err(err) if err.retryable && attempt < max_attempts => {
                    let delay = self.config.delay_for(attempt - 1);
                    debug!(
                        job_id = %ctx.job_id(),
                        stage = %self.name(),
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Retrying stage after error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.retryable {
                        warn!(
                            job_id = %ctx.job_id(),
                            stage = %self.name(),
                            attempts = attempt,
                            "Stage retries exhausted"
                        );
                    }
                    return Err(err);
                }
                Ok(result) => return Ok(result),
            }
        }
    }
}
