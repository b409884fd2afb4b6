//! Shared token-bucket limiter for embedding requests.
//!
//! One [`EmbedRateLimiter`] is created per run and cloned into every
//! embedding call site, so concurrent batches draw from the same budget.
//! Backoff after failures is handled separately by the retry policy in
//! [`crate::embedding`].

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::trace;

#[derive(Clone)]
pub struct EmbedRateLimiter {
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl EmbedRateLimiter {
    /// Allow `requests_per_minute` calls per minute, bursting up to
    /// `burst` calls at once.
    pub fn per_minute(requests_per_minute: NonZeroU32, burst: NonZeroU32) -> Self {
        let quota = Quota::per_minute(requests_per_minute).allow_burst(burst);
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Build from the optional `embedding.requests_per_minute` setting.
    /// The burst is the in-flight cap, bounded by the rate.
    pub fn from_config(requests_per_minute: Option<u32>, concurrency: usize) -> Option<Self> {
        let rpm = NonZeroU32::new(requests_per_minute?)?;
        let burst = u32::try_from(concurrency)
            .ok()
            .and_then(NonZeroU32::new)
            .unwrap_or(NonZeroU32::MIN)
            .min(rpm);
        Some(Self::per_minute(rpm, burst))
    }

    /// Wait until a request is allowed.
    pub async fn acquire(&self) {
        if self.limiter.check().is_ok() {
            return;
        }
        trace!("embedding rate limit reached, waiting");
        self.limiter.until_ready().await;
    }
}
