//! Rate limiting logic and counter stores.

mod backend;
mod counter;
mod descriptor;
mod limiter;
mod local;
mod policy;
mod remote;

pub use backend::CounterBackend;
pub use counter::{CounterEntry, RateLimitResult};
pub use descriptor::CounterKey;
pub use limiter::{LimiterMode, RateLimiter};
pub use local::{LocalCounterStore, DEFAULT_EVICTION_THRESHOLD};
pub use policy::{
    PolicyRule, PolicyTable, RateLimitPolicy, AI_POLICY, GENERAL_POLICY, MAX_WINDOW,
};
pub use remote::{RemoteCounterStore, RemoteError, DEFAULT_TIMEOUT};
