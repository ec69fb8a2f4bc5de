//! Rate limit policies and the named policy table.
//!
//! A policy is the immutable quota attached to one category of protected
//! operation. Policies are usually built from named rules loaded out of
//! configuration, with built-in presets for AI calls and general traffic.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Result, ThrottleError};

/// Namespace and name of the preset guarding third-party AI calls.
pub const AI_POLICY: &str = "ai";
/// Namespace and name of the preset guarding general traffic.
pub const GENERAL_POLICY: &str = "general";

/// Longest window a policy may use: 366 days.
pub const MAX_WINDOW: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// Quota for one protected operation category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    max_requests: u32,
    window: Duration,
    namespace: String,
}

impl RateLimitPolicy {
    /// Create a validated policy.
    pub fn new(max_requests: u32, window: Duration, namespace: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();

        if max_requests == 0 {
            return Err(ThrottleError::InvalidPolicy(format!(
                "{}: max_requests must be greater than zero",
                namespace
            )));
        }
        if window.is_zero() {
            return Err(ThrottleError::InvalidPolicy(format!(
                "{}: window must be greater than zero",
                namespace
            )));
        }
        if window > MAX_WINDOW {
            return Err(ThrottleError::InvalidPolicy(format!(
                "{}: window must not exceed {} seconds",
                namespace,
                MAX_WINDOW.as_secs()
            )));
        }
        if namespace.is_empty() {
            return Err(ThrottleError::InvalidPolicy(
                "namespace must not be empty".to_string(),
            ));
        }

        Ok(Self {
            max_requests,
            window,
            namespace,
        })
    }

    /// Tight preset for AI calls: 10 requests per hour.
    pub fn ai() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(3600),
            namespace: AI_POLICY.to_string(),
        }
    }

    /// Loose preset for general traffic: 100 requests per minute.
    pub fn general() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            namespace: GENERAL_POLICY.to_string(),
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Window length in whole seconds, rounded up and never zero.
    ///
    /// The remote store only expires keys at second granularity.
    pub fn window_secs_ceil(&self) -> u64 {
        let secs = self
            .window
            .as_secs()
            .saturating_add(u64::from(self.window.subsec_nanos() > 0));
        secs.max(1)
    }
}

/// A named policy rule as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Number of requests allowed per window
    pub max_requests: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

/// Named policy rules, keyed by namespace.
///
/// Names are case-insensitive and stored lowercased, matching how layered
/// configuration reports map keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyTable {
    rules: HashMap<String, PolicyRule>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::new().with_presets()
    }
}

impl PolicyTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Load policy rules from a YAML mapping of name to rule.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let parsed: HashMap<String, PolicyRule> = serde_yaml::from_str(yaml)
            .map_err(|e| ThrottleError::Config(format!("Failed to parse policies: {}", e)))?;

        let mut table = Self::new();
        for (name, rule) in parsed {
            table.insert(name, rule);
        }
        table.validate()?;
        Ok(table)
    }

    /// Fill in the built-in presets for any name not already present.
    pub fn with_presets(mut self) -> Self {
        for preset in [RateLimitPolicy::ai(), RateLimitPolicy::general()] {
            self.rules
                .entry(preset.namespace().to_string())
                .or_insert(PolicyRule {
                    max_requests: preset.max_requests(),
                    window_secs: preset.window().as_secs(),
                });
        }
        self
    }

    /// Add or replace a rule.
    pub fn insert(&mut self, name: impl Into<String>, rule: PolicyRule) {
        self.rules.insert(name.into().to_lowercase(), rule);
    }

    /// Check that every rule builds a valid policy.
    pub fn validate(&self) -> Result<()> {
        for name in self.rules.keys() {
            self.policy(name)?;
        }
        Ok(())
    }

    /// Build the policy registered under `name`.
    pub fn policy(&self, name: &str) -> Result<RateLimitPolicy> {
        let name = name.to_lowercase();
        let rule = self
            .rules
            .get(&name)
            .ok_or_else(|| ThrottleError::Config(format!("Unknown rate limit policy: {}", name)))?;

        RateLimitPolicy::new(rule.max_requests, Duration::from_secs(rule.window_secs), name)
    }

    /// Names of all registered policies, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
