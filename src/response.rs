//! Rejection payloads for requests over their quota.
//!
//! Quota state is reported in standard HTTP headers:
//! - `X-RateLimit-Limit`: Maximum requests allowed in the window
//! - `X-RateLimit-Remaining`: Requests remaining in the current window
//! - `X-RateLimit-Reset`: Unix timestamp when the window resets
//! - `Retry-After`: Seconds to wait (only on rejections)

use chrono::{DateTime, Utc};
use http::header::RETRY_AFTER;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::Serialize;

use crate::ratelimit::RateLimitResult;

/// Standard rate limit header names.
pub mod headers {
    use super::HeaderName;

    /// Maximum requests allowed in the window.
    pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
    /// Requests remaining in the current window.
    pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
    /// Unix timestamp when the window resets.
    pub static X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
}

/// JSON body of a rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionBody {
    /// Human-readable retry message
    pub error: String,
    /// Seconds until the caller may retry
    pub retry_after: u64,
}

/// A "too many requests" response, ready for any HTTP transport.
#[derive(Debug, Clone)]
pub struct RejectionPayload {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: RejectionBody,
}

impl RejectionPayload {
    /// Serialize the body as JSON.
    pub fn body_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.body)
    }
}

/// Build the rejection sent to a caller whose request was refused.
pub fn build_exceeded_response(result: &RateLimitResult) -> RejectionPayload {
    build_exceeded_response_at(result, Utc::now())
}

/// Same as [`build_exceeded_response`] with an explicit clock reading.
pub fn build_exceeded_response_at(result: &RateLimitResult, now: DateTime<Utc>) -> RejectionPayload {
    let retry_after = retry_after_secs(result.reset_in_ms);
    let minutes = result.reset_in_ms.div_ceil(60_000).max(1);
    let unit = if minutes == 1 { "minute" } else { "minutes" };

    let mut map = quota_headers_at(result, now);
    map.insert(RETRY_AFTER, HeaderValue::from(retry_after));

    RejectionPayload {
        status: StatusCode::TOO_MANY_REQUESTS,
        headers: map,
        body: RejectionBody {
            error: format!("Too many requests. Please try again in {} {}.", minutes, unit),
            retry_after,
        },
    }
}

/// Quota headers describing `result`, for allowed and rejected responses alike.
pub fn quota_headers(result: &RateLimitResult) -> HeaderMap {
    quota_headers_at(result, Utc::now())
}

fn quota_headers_at(result: &RateLimitResult, now: DateTime<Utc>) -> HeaderMap {
    let reset_at = now.timestamp_millis().saturating_add(result.reset_in_ms as i64);
    // Round up so the advertised reset is never before the real one.
    let reset_unix = reset_at.saturating_add(999).div_euclid(1000);

    let mut map = HeaderMap::new();
    map.insert(headers::X_RATELIMIT_LIMIT.clone(), HeaderValue::from(result.limit));
    map.insert(headers::X_RATELIMIT_REMAINING.clone(), HeaderValue::from(result.remaining));
    map.insert(headers::X_RATELIMIT_RESET.clone(), HeaderValue::from(reset_unix));
    map
}

/// Whole seconds until retry, rounded up and never zero.
fn retry_after_secs(reset_in_ms: u64) -> u64 {
    reset_in_ms.div_ceil(1000).max(1)
}
