//! Counter key generation.

use std::fmt;

/// Prefix shared by every counter key in the remote store.
const KEY_PREFIX: &str = "ratelimit";

/// A key that uniquely identifies a counter.
///
/// Namespaces keep independent quota pools apart inside one store, so the
/// same identity can be counted separately per protected operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    /// The policy namespace this counter belongs to
    pub namespace: String,
    /// The caller identity being counted
    pub identity: String,
}

impl CounterKey {
    /// Create a new counter key from a namespace and identity.
    pub fn new(namespace: &str, identity: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            identity: identity.to_string(),
        }
    }

    /// Render the key as stored remotely.
    /// Format: "ratelimit:{namespace}:{identity}"
    pub fn to_store_key(&self) -> String {
        format!("{}:{}:{}", KEY_PREFIX, self.namespace, self.identity)
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_store_key())
    }
}
