//! Throttle - Fixed-Window Request Throttling
//!
//! This crate bounds how often a caller identity may invoke an expensive
//! operation. Counters live in a shared remote key/value service when one is
//! configured, and in a process-local map otherwise or whenever the remote
//! store fails. A decision is always produced.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod response;

pub use ratelimit::{RateLimitPolicy, RateLimitResult, RateLimiter};
pub use response::{build_exceeded_response, RejectionPayload};
