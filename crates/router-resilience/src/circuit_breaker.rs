//! Per-vendor circuit breaker.
//!
//! Closed until a run of consecutive 5xx/transport failures reaches the
//! threshold, then open for a cooldown, then half-open for exactly one
//! probe request whose outcome decides between closing and reopening.
//!
//! Rate limiting never moves the breaker: a 429 is a cooperation signal,
//! not an infrastructure outage, and the rate-limit tracker owns it.

use crate::store::StateStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use router_core::Vendor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are rejected until the cooldown elapses.
    Open,
    /// One probe request is in flight.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open before probing.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Serializable view of a breaker, used by the status endpoint and the
/// shared store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures since the last success.
    pub failure_count: u32,
    /// When the circuit last opened.
    pub opened_at: Option<DateTime<Utc>>,
    /// Whether a half-open probe is in flight.
    pub probe_in_flight: bool,
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<DateTime<Utc>>,
    probe_in_flight: bool,
}

/// Circuit breaker for a single vendor.
pub struct CircuitBreaker {
    vendor: Vendor,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    store: Option<StateStore>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    #[must_use]
    pub fn new(vendor: Vendor, config: CircuitBreakerConfig) -> Self {
        Self {
            vendor,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
            store: None,
        }
    }

    /// Attach a shared state backing; every transition writes through.
    #[must_use]
    pub fn with_store(mut self, store: StateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// The vendor this breaker guards.
    #[must_use]
    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Whether a request may be sent to this vendor right now.
    ///
    /// An open circuit whose cooldown has elapsed transitions to half-open
    /// here and admits the single caller that observed the transition; any
    /// further caller is rejected until the probe resolves.
    pub fn is_available(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map_or(true, |at| Utc::now() - at >= chrono_cooldown(self.config.cooldown));
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    info!(vendor = %self.vendor, "circuit half-open, probing");
                    self.persist(&inner);
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a successful vendor response.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            info!(vendor = %self.vendor, "circuit closed");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
        self.persist(&inner);
    }

    /// Record a 5xx or transport failure. The caller is responsible for
    /// filtering out 429 and other 4xx responses.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Utc::now());
                    warn!(
                        vendor = %self.vendor,
                        failures = inner.failure_count,
                        "circuit opened"
                    );
                } else {
                    debug!(
                        vendor = %self.vendor,
                        failures = inner.failure_count,
                        threshold = self.config.failure_threshold,
                        "vendor failure recorded"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Utc::now());
                inner.probe_in_flight = false;
                warn!(vendor = %self.vendor, "probe failed, circuit reopened");
            }
            CircuitState::Open => {}
        }
        self.persist(&inner);
    }

    /// Serializable snapshot of the current state.
    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            opened_at: inner.opened_at,
            probe_in_flight: inner.probe_in_flight,
        }
    }

    /// Restore state from a snapshot (startup reload).
    pub fn restore(&self, snapshot: BreakerSnapshot) {
        let mut inner = self.inner.lock();
        inner.state = snapshot.state;
        inner.failure_count = snapshot.failure_count;
        inner.opened_at = snapshot.opened_at;
        inner.probe_in_flight = snapshot.probe_in_flight;
    }

    fn persist(&self, inner: &Inner) {
        if let Some(store) = &self.store {
            let snapshot = BreakerSnapshot {
                state: inner.state,
                failure_count: inner.failure_count,
                opened_at: inner.opened_at,
                probe_in_flight: inner.probe_in_flight,
            };
            let ttl = self.config.cooldown * 3;
            store.write_json_detached(store.breaker_key(self.vendor.as_str()), &snapshot, ttl);
        }
    }
}

fn chrono_cooldown(cooldown: Duration) -> chrono::Duration {
    chrono::Duration::from_std(cooldown).unwrap_or_else(|_| chrono::Duration::seconds(60))
}

/// Registry holding one breaker per vendor.
pub struct VendorBreakers {
    breakers: DashMap<Vendor, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
    store: Option<StateStore>,
}

impl VendorBreakers {
    /// Create an empty registry.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
            store: None,
        }
    }

    /// Attach a shared state backing for every breaker created.
    #[must_use]
    pub fn with_store(mut self, store: StateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Get or lazily create the breaker for a vendor.
    pub fn get_or_create(&self, vendor: Vendor) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(vendor)
            .or_insert_with(|| {
                let mut breaker = CircuitBreaker::new(vendor, self.config.clone());
                if let Some(store) = &self.store {
                    breaker = breaker.with_store(store.clone());
                }
                Arc::new(breaker)
            })
            .clone()
    }

    /// Snapshot every known vendor's breaker.
    #[must_use]
    pub fn snapshots(&self) -> Vec<(Vendor, BreakerSnapshot)> {
        self.breakers
            .iter()
            .map(|entry| (*entry.key(), entry.value().snapshot()))
            .collect()
    }

    /// Reload breaker state from the shared store; malformed or unknown
    /// entries are skipped and the registry starts empty on any failure.
    pub async fn load_from(&self, store: &StateStore) {
        for key in store.scan_section("cb").await {
            let Some(vendor_raw) = key.rfind(":cb:").map(|i| &key[i + 4..]) else {
                continue;
            };
            let Ok(vendor) = vendor_raw.parse::<Vendor>() else {
                continue;
            };
            if let Some(snapshot) = store.load_json::<BreakerSnapshot>(&key).await {
                self.get_or_create(vendor).restore(snapshot);
                debug!(vendor = %vendor, "breaker state reloaded from shared store");
            }
        }
    }
}
