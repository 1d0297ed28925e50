//! Bounded exponential-backoff retry at the model boundary.
//!
//! [`RetryingClient`] is itself a [`ClientWrapper`], so it can be slotted between the
//! agents and any provider without either side noticing. Each attempt first passes the
//! optional shared [`RateLimiter`]; a failed attempt is logged and swallowed until the
//! last one, whose failure is surfaced as [`DiscussionError::TransientRequest`].
//!
//! ```text
//! attempt 0 ──fail──> sleep base·2¹ ──> attempt 1 ──fail──> sleep base·2² ──> attempt 2 ──fail──> Err
//! ```

use crate::roundtable::client_wrapper::{ClientWrapper, ModelRequest, ModelResponse};
use crate::roundtable::error::{ClientError, DiscussionError};
use crate::roundtable::rate_limiter::RateLimiter;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: usize = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Wraps another client with rate limiting and retries.
pub struct RetryingClient {
    inner: Arc<dyn ClientWrapper>,
    rate_limiter: Option<Arc<RateLimiter>>,
    max_retries: usize,
    base_delay: Duration,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn ClientWrapper>) -> Self {
        Self {
            inner,
            rate_limiter: None,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    /// Total number of attempts, including the first. Zero is treated as one.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Unit of the backoff schedule; the delay before attempt `k` is `base_delay * 2^k`.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Share a limiter across clients so that all agents draw from one budget.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_retries.max(1)
    }

    /// Delay slept before the 0-based attempt `attempt`. The first attempt never waits.
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt.min(31) as u32);
        self.base_delay.saturating_mul(factor)
    }
}

#[async_trait]
impl ClientWrapper for RetryingClient {
    async fn send_request(&self, request: &ModelRequest) -> Result<ModelResponse, ClientError> {
        let attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                tokio::time::sleep(self.backoff_delay(attempt)).await;
            }
            if let Some(limiter) = &self.rate_limiter {
                limiter.check_limit().await;
            }

            match self.inner.send_request(request).await {
                Ok(response) => return Ok(response),
                Err(err) if attempt + 1 >= attempts => {
                    log::error!(
                        "RetryingClient::send_request(...): {} request for '{}' failed after {} attempt(s): {}",
                        self.inner.model_name(),
                        request.agent_type,
                        attempts,
                        err
                    );
                    return Err(Box::new(DiscussionError::TransientRequest {
                        attempts,
                        message: err.to_string(),
                    }));
                }
                Err(err) => {
                    log::warn!(
                        "RetryingClient::send_request(...): attempt {}/{} for '{}' failed, retrying in {:?}: {}",
                        attempt + 1,
                        attempts,
                        request.agent_type,
                        self.backoff_delay(attempt + 1),
                        err
                    );
                    attempt += 1;
                }
            }
        }
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
