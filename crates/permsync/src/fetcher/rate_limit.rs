//! Rate limiting for permissions fetchers.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::entity::external_account::Model as ExternalAccount;

use super::types::{
    ExternalAccountId, ExternalRepoId, ExternalRepoSpec, FetchResult, PermsFetcher,
};

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// A standalone API rate limiter using the governor crate.
///
/// Can be shared between fetchers that talk to the same code-host instance
/// through different credentials.
///
/// # Example
///
/// ```ignore
/// use permsync::fetcher::ApiRateLimiter;
///
/// let limiter = ApiRateLimiter::new(5); // 5 requests per second
///
/// // Before each API call:
/// limiter.wait().await;
/// client.some_api_call().await?;
/// ```
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl ApiRateLimiter {
    /// Create a new rate limiter with the specified requests per second.
    ///
    /// # Arguments
    ///
    /// * `requests_per_second` - Maximum requests per second (must be > 0, defaults to 1 if 0)
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rps));

        Self {
            inner: Arc::new(rate_limiter),
        }
    }

    /// Wait until a request is allowed by the rate limiter.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

/// A rate-limited wrapper around any [`PermsFetcher`].
///
/// This decorator applies proactive rate limiting to keep permission sweeps
/// inside the code host's API budget. Both fetch methods wait for the rate
/// limiter before delegating to the inner fetcher.
///
/// # Example
///
/// ```ignore
/// use permsync::fetcher::{FetcherRegistry, RateLimitedFetcher};
///
/// let registry = FetcherRegistry::new();
/// registry.register_rate_limited(my_fetcher, 5);
/// ```
pub struct RateLimitedFetcher<F> {
    inner: F,
    rate_limiter: Arc<GovernorRateLimiter>,
}

impl<F> RateLimitedFetcher<F> {
    /// Create a new rate-limited fetcher wrapper.
    ///
    /// # Arguments
    ///
    /// * `inner` - The underlying fetcher to wrap
    /// * `requests_per_second` - Maximum requests per second (must be > 0)
    pub fn new(inner: F, requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rps));

        Self {
            inner,
            rate_limiter: Arc::new(rate_limiter),
        }
    }

    /// Get a reference to the inner fetcher.
    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// Wait for the rate limiter before making a request.
    async fn wait(&self) {
        self.rate_limiter.until_ready().await;
    }
}

// Implement Clone if the inner fetcher is Clone
impl<F: Clone> Clone for RateLimitedFetcher<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            rate_limiter: Arc::clone(&self.rate_limiter),
        }
    }
}

#[async_trait]
impl<F: PermsFetcher> PermsFetcher for RateLimitedFetcher<F> {
    fn service_type(&self) -> &str {
        self.inner.service_type()
    }

    fn service_id(&self) -> &str {
        self.inner.service_id()
    }

    async fn fetch_user_perms(&self, account: &ExternalAccount) -> FetchResult<ExternalRepoId> {
        self.wait().await;
        self.inner.fetch_user_perms(account).await
    }

    async fn fetch_repo_perms(&self, repo: &ExternalRepoSpec) -> FetchResult<ExternalAccountId> {
        self.wait().await;
        self.inner.fetch_repo_perms(repo).await
    }
}
