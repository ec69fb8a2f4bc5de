//! Trait for shared counter stores the rate limiter can delegate to.

use async_trait::async_trait;

use super::counter::RateLimitResult;
use super::descriptor::CounterKey;
use super::policy::RateLimitPolicy;
use super::remote::RemoteError;

/// A counter store shared between every instance of the service.
///
/// This trait abstracts over the `RemoteCounterStore` so the `RateLimiter`
/// can work with any shared store. Failures are returned, never panicked on;
/// the limiter answers from its local store instead.
#[async_trait]
pub trait CounterBackend: Send + Sync {
    /// Atomically count a request against `key` and decide on it.
    async fn check_and_increment(
        &self,
        key: &CounterKey,
        policy: &RateLimitPolicy,
    ) -> Result<RateLimitResult, RemoteError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}
