//! Fixed-window counter state and the decision it produces.

use serde::Serialize;
use std::time::{Duration, Instant};

/// Outcome of a single rate limit check.
///
/// Computed fresh for every call and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResult {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u32,
    /// Milliseconds until the current window resets
    pub reset_in_ms: u64,
    /// The quota of the policy that produced this result
    pub limit: u32,
}

impl RateLimitResult {
    /// An allowed decision.
    pub fn allowed(limit: u32, remaining: u32, reset_in: Duration) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_in_ms: duration_to_ms(reset_in),
            limit,
        }
    }

    /// A rejected decision. Nothing remains in a rejected window.
    pub fn rejected(limit: u32, reset_in: Duration) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_in_ms: duration_to_ms(reset_in),
            limit,
        }
    }

    /// Time until the window resets.
    pub fn reset_in(&self) -> Duration {
        Duration::from_millis(self.reset_in_ms)
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Requests counted for one key within one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterEntry {
    /// Requests accepted in this window
    pub count: u32,
    /// When this window ends
    pub reset_at: Instant,
}

impl CounterEntry {
    /// Open a new window at `now` holding its first request.
    pub fn open(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            reset_at: now + window,
        }
    }

    /// Whether the window has passed at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.reset_at
    }

    /// Duration until the window resets, zero once it has passed.
    pub fn duration_until_reset(&self, now: Instant) -> Duration {
        self.reset_at.saturating_duration_since(now)
    }
}
