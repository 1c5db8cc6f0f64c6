//! Fixed-spacing throttles placed in front of every page request.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::time::Duration;

/// Polite delay for NCBI E-utilities
pub const PUBMED_DELAY: Duration = Duration::from_millis(500);
/// Polite delay for the OpenAlex API
pub const OPENALEX_DELAY: Duration = Duration::from_secs(1);
/// Polite delay for the Elsevier search API
pub const SCOPUS_DELAY: Duration = Duration::from_secs(1);

/// Gate every outbound request of one adapter passes through.
#[async_trait]
pub trait RateGate: Send + Sync + std::fmt::Debug {
    /// Wait until the next request may be issued
    async fn wait(&self);
}

/// Enforces a fixed minimum spacing between consecutive requests.
///
/// The first request passes immediately. The delay never adapts to
/// server feedback.
pub struct FixedDelay {
    delay: Duration,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        let limiter = Quota::with_period(delay)
            .map(|quota| RateLimiter::direct(quota.allow_burst(nonzero!(1u32))));
        Self { delay, limiter }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl std::fmt::Debug for FixedDelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedDelay")
            .field("delay", &self.delay)
            .finish()
    }
}

#[async_trait]
impl RateGate for FixedDelay {
    async fn wait(&self) {
        // A zero delay builds no limiter.
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

/// Lets every request through; used by tests and local mock servers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelay;

#[async_trait]
impl RateGate for NoDelay {
    async fn wait(&self) {}
}
