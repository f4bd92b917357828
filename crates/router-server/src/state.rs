//! Shared application state.

use router_queue::RequestQueue;
use router_resilience::{RateLimitTracker, VendorBreakers};
use router_routing::Router;
use secrecy::SecretString;
use std::sync::Arc;

/// Service name reported by the health endpoint.
pub const SERVICE_NAME: &str = "llm-router";

/// Everything the handlers share. Cheap to clone; all fields are `Arc`s.
#[derive(Clone)]
pub struct AppState {
    /// The routing core.
    pub router: Arc<Router>,
    /// The deferred-retry queue (also owned by the router; handlers poll it).
    pub queue: Arc<RequestQueue>,
    /// Per-vendor circuit breakers, for the status snapshot.
    pub breakers: Arc<VendorBreakers>,
    /// The rate-limit tracker, for the status snapshot.
    pub tracker: Arc<RateLimitTracker>,
    /// Inbound auth token.
    pub router_api_key: SecretString,
}
