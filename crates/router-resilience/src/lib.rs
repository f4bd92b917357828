//! # Router Resilience
//!
//! The stateful guards that sit between the routing loop and the vendors:
//! - Vendor rate-limit header parsing into a common shape
//! - Per-(vendor, model) rate-limit tracking with proactive skip
//! - Per-vendor circuit breaking over 5xx failures
//! - An optional shared KV backing so multiple instances agree

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod circuit_breaker;
pub mod headers;
pub mod rate_limit;
pub mod store;

pub use circuit_breaker::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState, VendorBreakers,
};
pub use headers::{parse_reset_duration, parse_retry_after, RateLimitSnapshot};
pub use rate_limit::{ModelLimitState, RateLimitTracker};
pub use store::{KvStore, MemoryStore, RedisStore, StateStore};
