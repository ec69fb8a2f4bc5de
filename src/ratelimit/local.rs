//! Process-local fixed-window counter store.

use dashmap::DashMap;
use std::time::Instant;
use tracing::{debug, trace};

use super::counter::{CounterEntry, RateLimitResult};
use super::descriptor::CounterKey;
use super::policy::RateLimitPolicy;

/// Map size above which expired entries are swept on the next check.
pub const DEFAULT_EVICTION_THRESHOLD: usize = 10_000;

/// In-memory fixed-window counters, shared by every request handler in the
/// process.
///
/// Each check runs under the per-key entry lock of the underlying sharded
/// map, so the increment-or-create step is atomic. Counts are only accurate
/// within this process: with several instances the effective quota is
/// `max_requests * instance_count`.
#[derive(Debug)]
pub struct LocalCounterStore {
    /// Counters indexed by namespace and identity
    counters: DashMap<CounterKey, CounterEntry>,
    /// Size above which expired counters are swept
    eviction_threshold: usize,
}

impl LocalCounterStore {
    /// Create a store with the default eviction threshold.
    pub fn new() -> Self {
        Self::with_eviction_threshold(DEFAULT_EVICTION_THRESHOLD)
    }

    /// Create a store that sweeps expired counters once it holds more than
    /// `eviction_threshold` entries.
    pub fn with_eviction_threshold(eviction_threshold: usize) -> Self {
        Self {
            counters: DashMap::new(),
            eviction_threshold,
        }
    }

    /// Count a request for `identity` under `policy` and decide on it.
    pub fn check_and_increment(&self, identity: &str, policy: &RateLimitPolicy) -> RateLimitResult {
        self.check_and_increment_at(identity, policy, Instant::now())
    }

    /// Same as [`check_and_increment`](Self::check_and_increment) with an
    /// explicit clock reading.
    pub fn check_and_increment_at(
        &self,
        identity: &str,
        policy: &RateLimitPolicy,
        now: Instant,
    ) -> RateLimitResult {
        // Sweep before taking the entry lock; retain locks every shard.
        if self.counters.len() > self.eviction_threshold {
            self.evict_expired(now);
        }

        let key = CounterKey::new(policy.namespace(), identity);
        let max = policy.max_requests();

        trace!(key = %key, limit = max, "Checking local rate limit");

        let mut entry = self
            .counters
            .entry(key)
            .or_insert_with(|| CounterEntry {
                count: 0,
                reset_at: now,
            });

        if entry.count == 0 || entry.is_expired(now) {
            debug!(key = %entry.key(), window = ?policy.window(), "Opening local rate limit window");
            *entry = CounterEntry::open(now, policy.window());
            return RateLimitResult::allowed(max, max - 1, entry.duration_until_reset(now));
        }

        if entry.count < max {
            entry.count += 1;
            return RateLimitResult::allowed(max, max - entry.count, entry.duration_until_reset(now));
        }

        debug!(key = %entry.key(), count = entry.count, limit = max, "Local rate limit exceeded");
        RateLimitResult::rejected(max, entry.duration_until_reset(now))
    }

    /// Drop every counter whose window has passed. Returns how many were dropped.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, entry| !entry.is_expired(now));
        let evicted = before.saturating_sub(self.counters.len());

        debug!(evicted = evicted, remaining = self.counters.len(), "Evicted expired local counters");
        evicted
    }

    /// Current count for a key, if a counter exists.
    pub fn count(&self, namespace: &str, identity: &str) -> Option<u32> {
        self.counters
            .get(&CounterKey::new(namespace, identity))
            .map(|entry| entry.count)
    }

    /// Number of tracked counters.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Clear all counters.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.counters.clear();
    }
}

impl Default for LocalCounterStore {
    fn default() -> Self {
        Self::new()
    }
}
