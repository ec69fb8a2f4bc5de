//! Remote fixed-window counter store.
//!
//! Counters live in an external key/value service that exposes atomic
//! increments over a bearer-authenticated REST endpoint. Every instance of
//! the service shares them, so the quota holds globally rather than per
//! process.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

use super::backend::CounterBackend;
use super::counter::RateLimitResult;
use super::descriptor::CounterKey;
use super::policy::RateLimitPolicy;

/// Default timeout applied to every remote call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// TTL reply for a key that exists without an expiry.
const TTL_NO_EXPIRY: i64 = -1;

/// Errors that can occur talking to the remote store.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Remote store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Remote store returned status {0}")]
    Status(u16),
    #[error("Remote store rejected command: {0}")]
    Command(String),
    #[error("Malformed remote store response: {0}")]
    Malformed(String),
}

/// Reply body of a single command.
#[derive(Debug, Deserialize)]
struct CommandReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Fixed-window counters in a shared key/value service.
///
/// Uses a fixed-window counter algorithm:
/// 1. INCR the key to count the request
/// 2. If the count is 1 the key is new, so EXPIRE it after the window
/// 3. TTL the key to learn when the window resets
/// 4. If count > limit, reject the request
///
/// The increment is atomic on the server, so concurrent instances never lose
/// updates for the same identity.
#[derive(Debug, Clone)]
pub struct RemoteCounterStore {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl RemoteCounterStore {
    /// Create a store for the endpoint at `url`, authenticating with `token`.
    pub fn new(url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: url.into(),
            token: token.into(),
        })
    }

    /// The endpoint this store talks to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Count a request against `key` and decide on it.
    pub async fn check_and_increment(
        &self,
        key: &CounterKey,
        policy: &RateLimitPolicy,
    ) -> Result<RateLimitResult, RemoteError> {
        let store_key = key.to_store_key();
        let window_secs = policy.window_secs_ceil().to_string();

        let count = self.integer_command(&["INCR", &store_key]).await?;
        let count = u64::try_from(count)
            .map_err(|_| RemoteError::Malformed(format!("negative count {} for {}", count, store_key)))?;

        trace!(key = %store_key, count = count, "Incremented remote counter");

        // Only the request that created the key starts the window.
        if count == 1 {
            self.integer_command(&["EXPIRE", &store_key, &window_secs]).await?;
        }

        let ttl = self.integer_command(&["TTL", &store_key]).await?;
        let reset_in = if ttl >= 0 {
            Duration::from_secs(ttl as u64)
        } else {
            if ttl == TTL_NO_EXPIRY {
                // The EXPIRE that should have followed creation was lost.
                debug!(key = %store_key, "Remote counter has no expiry, restoring it");
                self.integer_command(&["EXPIRE", &store_key, &window_secs]).await?;
            }
            Duration::from_secs(policy.window_secs_ceil())
        };

        let max = policy.max_requests();
        if count <= u64::from(max) {
            Ok(RateLimitResult::allowed(max, max - count as u32, reset_in))
        } else {
            debug!(
                key = %store_key,
                count = count,
                limit = max,
                "Remote rate limit exceeded"
            );
            Ok(RateLimitResult::rejected(max, reset_in))
        }
    }

    /// Send one command and return its `result` field.
    async fn command(&self, args: &[&str]) -> Result<Value, RemoteError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(args)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status.as_u16()));
        }

        let reply: CommandReply = response
            .json()
            .await
            .map_err(|e| RemoteError::Malformed(e.to_string()))?;

        match reply {
            CommandReply { error: Some(error), .. } => Err(RemoteError::Command(error)),
            CommandReply { result: Some(result), .. } => Ok(result),
            CommandReply { .. } => Err(RemoteError::Malformed(format!(
                "no result for {}",
                args.first().copied().unwrap_or_default()
            ))),
        }
    }

    /// Send one command whose result must be an integer.
    async fn integer_command(&self, args: &[&str]) -> Result<i64, RemoteError> {
        let result = self.command(args).await?;

        let parsed = match &result {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        };

        parsed.ok_or_else(|| RemoteError::Malformed(format!("expected integer, got {}", result)))
    }
}

#[async_trait]
impl CounterBackend for RemoteCounterStore {
    async fn check_and_increment(
        &self,
        key: &CounterKey,
        policy: &RateLimitPolicy,
    ) -> Result<RateLimitResult, RemoteError> {
        RemoteCounterStore::check_and_increment(self, key, policy).await
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}
