use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::capture::WindowMetadata;

use super::parse::Classification;
use super::rate_limit::RateLimiter;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("classification call timed out")]
    Timeout,
    #[error("classification call rate limited")]
    RateLimited,
    #[error("transient network error: {0}")]
    TransientNetwork(String),
    #[error("response did not match the expected schema: {0}")]
    InvalidResponse(String),
}

impl ClassifyError {
    /// Only transient conditions are worth another attempt inside the same
    /// cycle. Rate limiting degrades to a skipped cycle instead, and a
    /// malformed response will not improve on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClassifyError::Timeout | ClassifyError::TransientNetwork(_)
        )
    }
}

/// One classification request: the frame plus everything steering the
/// model's judgment.
#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    pub image_png: Arc<Vec<u8>>,
    pub goal: String,
    pub allowed: String,
    pub blocked: String,
    pub focus_hint: Option<WindowMetadata>,
}

/// External vision-capable model. Implementations translate the request
/// into a vendor call and parse the reply with
/// [`super::parse::parse_classification`]; nothing untyped crosses this
/// boundary.
#[async_trait]
pub trait ClassificationGateway: Send + Sync {
    async fn classify(&self, request: &ClassifyRequest) -> Result<Classification, ClassifyError>;
}

/// Wraps a gateway with the call discipline the scheduler relies on:
/// minimum spacing between calls, a per-attempt timeout, and a small
/// bounded retry budget. The adapter never sleeps waiting for the rate
/// limiter: an early call fails fast so the scheduler can skip the cycle.
pub struct GatewayAdapter {
    inner: Arc<dyn ClassificationGateway>,
    timeout: Duration,
    max_retries: u32,
    limiter: RateLimiter,
}

impl GatewayAdapter {
    pub fn new(
        inner: Arc<dyn ClassificationGateway>,
        timeout: Duration,
        max_retries: u32,
        max_requests_per_minute: u32,
    ) -> Self {
        Self {
            inner,
            timeout,
            max_retries,
            limiter: RateLimiter::per_minute(max_requests_per_minute),
        }
    }

    pub async fn classify(
        &self,
        request: &ClassifyRequest,
    ) -> Result<Classification, ClassifyError> {
        if !self.limiter.try_acquire() {
            return Err(ClassifyError::RateLimited);
        }

        let mut attempt: u32 = 0;
        loop {
            let outcome = match tokio::time::timeout(self.timeout, self.inner.classify(request))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ClassifyError::Timeout),
            };

            match outcome {
                Ok(classification) => return Ok(classification),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    log::warn!("classification attempt {attempt} failed, retrying: {err}");
                }
                Err(err) => return Err(err),
            }
        }
    }
}
