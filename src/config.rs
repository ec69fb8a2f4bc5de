//! Configuration management for the throttle.
//!
//! Settings are layered: built-in defaults, then an optional YAML file, then
//! environment variables prefixed with `THROTTLE__` (for example
//! `THROTTLE__REMOTE__URL` and `THROTTLE__REMOTE__TOKEN`).

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::Result;
use crate::ratelimit::{PolicyTable, DEFAULT_EVICTION_THRESHOLD, DEFAULT_TIMEOUT};

/// Prefix of environment variables read by [`ThrottleConfig::load`].
const ENV_PREFIX: &str = "THROTTLE";

/// Main configuration for the throttle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Shared remote counter store
    #[serde(default)]
    pub remote: RemoteStoreConfig,

    /// Process-local counter store
    #[serde(default)]
    pub local: LocalStoreConfig,

    /// Named rate limit policies
    #[serde(default)]
    pub policies: PolicyTable,
}

/// Remote store configuration.
///
/// Remote mode is enabled only when both `url` and `token` are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteStoreConfig {
    /// REST endpoint of the key/value service
    #[serde(default)]
    pub url: Option<String>,

    /// Bearer token for the key/value service
    #[serde(default)]
    pub token: Option<String>,

    /// Timeout for each remote call in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RemoteStoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RemoteStoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

/// Local store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStoreConfig {
    /// Number of counters above which expired ones are swept
    #[serde(default = "default_eviction_threshold")]
    pub eviction_threshold: usize,
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            eviction_threshold: default_eviction_threshold(),
        }
    }
}

fn default_eviction_threshold() -> usize {
    DEFAULT_EVICTION_THRESHOLD
}

impl ThrottleConfig {
    /// Load configuration from an optional YAML file and the environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!(path = %path, "Reading configuration file");
            builder = builder.add_source(File::with_name(path).format(FileFormat::Yaml));
        }

        let config: ThrottleConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.finalize()
    }

    /// Load configuration from a YAML string, ignoring the environment.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ThrottleConfig = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        config.finalize()
    }

    fn finalize(mut self) -> Result<Self> {
        self.policies = self.policies.with_presets();
        self.policies.validate()?;
        Ok(self)
    }

    /// Endpoint and token of the remote store, if both are configured.
    pub fn remote_credentials(&self) -> Option<(&str, &str)> {
        let url = self.remote.url.as_deref().filter(|u| !u.is_empty())?;
        let token = self.remote.token.as_deref().filter(|t| !t.is_empty())?;
        Some((url, token))
    }
}
