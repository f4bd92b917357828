//! # Router Routing
//!
//! Builds the ordered (vendor, vendor-model) fallback chain for a request
//! and drives the attempt loop across it, consulting the circuit breaker
//! and rate-limit tracker before each dispatch and handing exhausted
//! requests to the deferred-retry queue.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chain;
pub mod router;

pub use chain::{build_fallback_chain, Candidate};
pub use router::{ExecuteOutcome, QueuedResult, RoutedResponse, Router};
