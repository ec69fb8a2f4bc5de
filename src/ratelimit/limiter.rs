//! Rate limiter orchestrating the remote and local counter stores.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use super::backend::CounterBackend;
use super::counter::RateLimitResult;
use super::descriptor::CounterKey;
use super::local::LocalCounterStore;
use super::policy::RateLimitPolicy;
use super::remote::{RemoteCounterStore, RemoteError};
use crate::config::ThrottleConfig;

/// Which store answers checks when everything is healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterMode {
    /// Process-local counters only
    Local,
    /// Shared remote counters, falling back to local ones on failure
    Remote,
}

impl fmt::Display for LimiterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimiterMode::Local => write!(f, "local"),
            LimiterMode::Remote => write!(f, "remote"),
        }
    }
}

/// The rate limiter handed to request handlers.
///
/// When a shared backend is configured every check goes to it first; any
/// failure is logged and the same check is answered by the local store. The
/// routing is re-evaluated on every call: a failing backend is retried on the
/// next check, never suppressed. Checks always produce a decision.
pub struct RateLimiter {
    /// Process-local counters, authoritative when no backend answers
    local: LocalCounterStore,
    /// Shared counters, when configured
    remote: Option<Arc<dyn CounterBackend>>,
}

impl RateLimiter {
    /// Create a local-only rate limiter.
    pub fn new(local: LocalCounterStore) -> Self {
        Self { local, remote: None }
    }

    /// Create a rate limiter that prefers `remote` and falls back to `local`.
    pub fn with_remote(local: LocalCounterStore, remote: Arc<dyn CounterBackend>) -> Self {
        Self {
            local,
            remote: Some(remote),
        }
    }

    /// Build a rate limiter from configuration.
    ///
    /// Remote mode is used only when both an endpoint and a token are set.
    pub fn from_config(config: &ThrottleConfig) -> Result<Self, RemoteError> {
        let local = LocalCounterStore::with_eviction_threshold(config.local.eviction_threshold);

        let Some((url, token)) = config.remote_credentials() else {
            info!("No remote store configured, using local rate limiting");
            return Ok(Self::new(local));
        };

        let remote = RemoteCounterStore::new(url, token, config.remote.timeout())?;
        info!(url = %remote.url(), "Using remote rate limiting with local fallback");
        Ok(Self::with_remote(local, Arc::new(remote)))
    }

    /// The store this limiter consults first.
    pub fn mode(&self) -> LimiterMode {
        if self.remote.is_some() {
            LimiterMode::Remote
        } else {
            LimiterMode::Local
        }
    }

    /// The local store, also used as fallback.
    pub fn local(&self) -> &LocalCounterStore {
        &self.local
    }

    /// Count a request by `identity` under `policy` and decide on it.
    pub async fn check_rate_limit(&self, identity: &str, policy: &RateLimitPolicy) -> RateLimitResult {
        trace!(
            namespace = %policy.namespace(),
            identity = %identity,
            mode = %self.mode(),
            "Checking rate limit"
        );

        let result = match &self.remote {
            Some(remote) => {
                let key = CounterKey::new(policy.namespace(), identity);
                match remote.check_and_increment(&key, policy).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(
                            key = %key,
                            backend = remote.name(),
                            error = %e,
                            "Remote rate limit check failed, falling back to local store"
                        );
                        self.local.check_and_increment(identity, policy)
                    }
                }
            }
            None => self.local.check_and_increment(identity, policy),
        };

        if !result.allowed {
            debug!(
                namespace = %policy.namespace(),
                identity = %identity,
                reset_in_ms = result.reset_in_ms,
                "Rate limit exceeded"
            );
        }

        result
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(LocalCounterStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteStoreConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// A backend whose every call fails.
    struct UnreachableBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CounterBackend for UnreachableBackend {
        async fn check_and_increment(
            &self,
            _key: &CounterKey,
            _policy: &RateLimitPolicy,
        ) -> Result<RateLimitResult, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::Status(503))
        }

        fn name(&self) -> &'static str {
            "unreachable"
        }
    }

    /// A backend that allows everything with a fixed answer.
    struct FixedBackend;

    #[async_trait]
    impl CounterBackend for FixedBackend {
        async fn check_and_increment(
            &self,
            _key: &CounterKey,
            policy: &RateLimitPolicy,
        ) -> Result<RateLimitResult, RemoteError> {
            Ok(RateLimitResult::allowed(
                policy.max_requests(),
                42,
                Duration::from_secs(7),
            ))
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn hourly(max: u32) -> RateLimitPolicy {
        RateLimitPolicy::new(max, Duration::from_secs(3600), "ai").unwrap()
    }

    #[tokio::test]
    async fn test_rate_limiter_creation() {
        let limiter = RateLimiter::default();
        assert_eq!(limiter.mode(), LimiterMode::Local);
        assert!(limiter.local().is_empty());
    }

    #[tokio::test]
    async fn test_quota_exhaustion_and_rejection() {
        let limiter = RateLimiter::default();
        let policy = hourly(10);

        for i in 1..=10u32 {
            let result = limiter.check_rate_limit("user-a", &policy).await;
            assert!(result.allowed, "Request {} should be allowed", i);
            assert_eq!(result.remaining, 10 - i);
        }

        let result = limiter.check_rate_limit("user-a", &policy).await;
        assert!(!result.allowed);
        assert_eq!(result.remaining, 0);
        assert!(result.reset_in_ms > 3_590_000 && result.reset_in_ms <= 3_600_000);
    }

    #[tokio::test]
    async fn test_window_reset_after_expiry() {
        let limiter = RateLimiter::default();
        let policy = RateLimitPolicy::new(2, Duration::from_millis(50), "ai").unwrap();

        limiter.check_rate_limit("user-a", &policy).await;
        limiter.check_rate_limit("user-a", &policy).await;
        assert!(!limiter.check_rate_limit("user-a", &policy).await.allowed);

        tokio::time::sleep(Duration::from_millis(80)).await;

        let result = limiter.check_rate_limit("user-a", &policy).await;
        assert!(result.allowed);
        assert_eq!(result.remaining, 1);
    }

    #[tokio::test]
    async fn test_other_identity_unaffected_by_exhausted_quota() {
        let limiter = RateLimiter::default();
        let policy = hourly(10);

        for _ in 0..11 {
            limiter.check_rate_limit("user-a", &policy).await;
        }

        let result = limiter.check_rate_limit("user-b", &policy).await;
        assert!(result.allowed);
        assert_eq!(result.remaining, 9);
    }

    #[tokio::test]
    async fn test_remote_answer_is_used() {
        let limiter = RateLimiter::with_remote(LocalCounterStore::new(), Arc::new(FixedBackend));
        assert_eq!(limiter.mode(), LimiterMode::Remote);

        let result = limiter.check_rate_limit("user-a", &hourly(10)).await;

        assert_eq!(result.remaining, 42);
        assert_eq!(result.reset_in_ms, 7000);
        assert!(limiter.local().is_empty());
    }

    #[tokio::test]
    async fn test_failing_remote_degrades_to_local_behavior() {
        let backend = Arc::new(UnreachableBackend {
            calls: AtomicUsize::new(0),
        });
        let degraded = RateLimiter::with_remote(LocalCounterStore::new(), backend.clone());
        let local = RateLimiter::default();
        let policy = hourly(3);

        for identity in ["user-a", "user-a", "user-b", "user-a", "user-a", "user-b"] {
            let got = degraded.check_rate_limit(identity, &policy).await;
            let want = local.check_rate_limit(identity, &policy).await;

            assert_eq!(got.allowed, want.allowed);
            assert_eq!(got.remaining, want.remaining);
            assert_eq!(got.limit, want.limit);
        }

        // Every call retried the remote store
        assert_eq!(backend.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_from_config_without_credentials_is_local() {
        let mut config = ThrottleConfig::default();
        config.remote = RemoteStoreConfig {
            url: Some("https://kv.example.com".to_string()),
            token: None,
            ..RemoteStoreConfig::default()
        };

        let limiter = RateLimiter::from_config(&config).unwrap();
        assert_eq!(limiter.mode(), LimiterMode::Local);
    }

    #[tokio::test]
    async fn test_from_config_with_unreachable_remote_still_decides() {
        let mut config = ThrottleConfig::default();
        config.remote = RemoteStoreConfig {
            // Nothing listens on the discard port
            url: Some("http://127.0.0.1:9".to_string()),
            token: Some("token".to_string()),
            timeout_ms: 200,
        };

        let limiter = RateLimiter::from_config(&config).unwrap();
        assert_eq!(limiter.mode(), LimiterMode::Remote);

        let result = limiter.check_rate_limit("user-a", &hourly(10)).await;
        assert!(result.allowed);
        assert_eq!(result.remaining, 9);
        assert_eq!(limiter.local().count("ai", "user-a"), Some(1));
    }

    #[tokio::test]
    async fn test_failure_after_increment_falls_back_to_local() {
        use serde_json::json;
        use wiremock::matchers::{body_json, method};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!(["INCR", "ratelimit:ai:user-a"])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": 1})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_json(json!(["EXPIRE", "ratelimit:ai:user-a", "3600"])))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let remote = RemoteCounterStore::new(server.uri(), "token", Duration::from_millis(500)).unwrap();
        let limiter = RateLimiter::with_remote(LocalCounterStore::new(), Arc::new(remote));

        let result = limiter.check_rate_limit("user-a", &hourly(10)).await;

        assert!(result.allowed);
        assert_eq!(result.remaining, 9);
        assert_eq!(result.reset_in_ms, 3_600_000);
        assert_eq!(limiter.local().count("ai", "user-a"), Some(1));
    }
}
