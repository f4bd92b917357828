//! Per-(vendor, model) rate-limit tracking.
//!
//! The tracker remembers the last cooldown and counter snapshot for every
//! (vendor, model) pair it has seen, and answers two questions for the
//! routing loop: "should this candidate be skipped right now" and "when is
//! the earliest any of these candidates comes back".

use crate::headers::{parse_retry_after, RateLimitSnapshot};
use crate::store::StateStore;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use router_core::Vendor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Tracked state for one (vendor, model) pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelLimitState {
    /// Set when the last response was a 429.
    pub cooling_down: bool,
    /// When the cooldown elapses.
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Requests left, from the most recent successful response.
    pub remaining_requests: Option<u64>,
    /// Tokens left, from the most recent successful response.
    pub remaining_tokens: Option<u64>,
    /// When the request counter resets.
    pub reset_requests_at: Option<DateTime<Utc>>,
    /// When the token counter resets.
    pub reset_tokens_at: Option<DateTime<Utc>>,
}

/// Tracker over all (vendor, model) pairs.
pub struct RateLimitTracker {
    states: DashMap<(Vendor, String), ModelLimitState>,
    low_requests_threshold: u64,
    store: Option<StateStore>,
}

impl RateLimitTracker {
    /// Create a tracker with the given proactive-skip threshold.
    #[must_use]
    pub fn new(low_requests_threshold: u64) -> Self {
        Self {
            states: DashMap::new(),
            low_requests_threshold,
            store: None,
        }
    }

    /// Attach a shared state backing; every mutation writes through.
    #[must_use]
    pub fn with_store(mut self, store: StateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Fold a vendor response into the tracked state.
    ///
    /// A 429 starts (or extends) a cooldown using the response's
    /// `retry-after`. A 2xx overwrites the counter snapshot and clears any
    /// cooldown that has already elapsed. Other statuses leave the state
    /// untouched.
    pub fn update(
        &self,
        vendor: Vendor,
        model: &str,
        status: u16,
        headers: &HashMap<String, String>,
    ) {
        let now = Utc::now();
        let key = (vendor, model.to_string());
        let mut entry = self.states.entry(key).or_default();

        if status == 429 {
            let wait = parse_retry_after(headers.get("retry-after").map(String::as_str), now);
            let until = now
                + ChronoDuration::from_std(wait).unwrap_or_else(|_| ChronoDuration::seconds(60));
            entry.cooling_down = true;
            entry.cooldown_until = Some(until);
            warn!(
                vendor = %vendor,
                model = %model,
                cooldown_secs = wait.as_secs(),
                "rate limited, cooling down"
            );
        } else if (200..300).contains(&status) {
            let snapshot = RateLimitSnapshot::for_vendor(vendor, headers, now);
            entry.remaining_requests = snapshot.remaining_requests;
            entry.remaining_tokens = snapshot.remaining_tokens;
            entry.reset_requests_at = snapshot.reset_requests_at;
            entry.reset_tokens_at = snapshot.reset_tokens_at;

            if entry.cooling_down && entry.cooldown_until.map_or(true, |until| now >= until) {
                entry.cooling_down = false;
                entry.cooldown_until = None;
                debug!(vendor = %vendor, model = %model, "cooldown cleared");
            }
        }

        if let Some(store) = &self.store {
            let ttl = entry
                .cooldown_until
                .and_then(|until| (until - now).to_std().ok())
                .unwrap_or(Duration::ZERO)
                .max(Duration::from_secs(60));
            store.write_json_detached(store.limit_key(vendor.as_str(), model), &*entry, ttl);
        }
    }

    /// Whether the routing loop should skip this candidate right now.
    ///
    /// True while a cooldown is active, or when the remaining-request
    /// counter is known and strictly below the threshold. A cooldown that
    /// has already elapsed is cleared here as a side effect.
    pub fn should_avoid(&self, vendor: Vendor, model: &str) -> bool {
        let now = Utc::now();
        let Some(mut entry) = self.states.get_mut(&(vendor, model.to_string())) else {
            return false;
        };

        if entry.cooling_down {
            match entry.cooldown_until {
                Some(until) if now < until => return true,
                _ => {
                    entry.cooling_down = false;
                    entry.cooldown_until = None;
                }
            }
        }

        entry
            .remaining_requests
            .is_some_and(|remaining| remaining < self.low_requests_threshold)
    }

    /// Earliest instant at which any candidate is expected to be usable.
    ///
    /// A candidate contributes its cooldown end when cooling, its request
    /// reset when running low, and "now" otherwise (including when nothing
    /// is known about it). When no candidate offers any instant at all,
    /// falls back to one minute out.
    pub fn earliest_available<'a>(
        &self,
        candidates: impl IntoIterator<Item = (Vendor, &'a str)>,
    ) -> DateTime<Utc> {
        let now = Utc::now();
        let mut times = Vec::new();

        for (vendor, model) in candidates {
            match self.states.get(&(vendor, model.to_string())) {
                None => times.push(now),
                Some(state) => {
                    if state.cooling_down {
                        match state.cooldown_until {
                            Some(until) => times.push(until.max(now)),
                            None => times.push(now),
                        }
                    } else if state
                        .remaining_requests
                        .is_some_and(|remaining| remaining < self.low_requests_threshold)
                    {
                        if let Some(reset) = state.reset_requests_at {
                            times.push(reset.max(now));
                        }
                    } else {
                        times.push(now);
                    }
                }
            }
        }

        times
            .into_iter()
            .min()
            .unwrap_or_else(|| now + ChronoDuration::seconds(60))
    }

    /// Snapshot of one pair's state.
    #[must_use]
    pub fn state(&self, vendor: Vendor, model: &str) -> Option<ModelLimitState> {
        self.states
            .get(&(vendor, model.to_string()))
            .map(|s| s.clone())
    }

    /// Snapshot of every tracked pair, for the status endpoint.
    #[must_use]
    pub fn all_states(&self) -> Vec<(Vendor, String, ModelLimitState)> {
        self.states
            .iter()
            .map(|entry| {
                let (vendor, model) = entry.key();
                (*vendor, model.clone(), entry.value().clone())
            })
            .collect()
    }

    /// Seed a pair's state, used by the startup reload.
    pub fn seed(&self, vendor: Vendor, model: &str, state: ModelLimitState) {
        self.states.insert((vendor, model.to_string()), state);
    }

    /// Reload tracked state from the shared store. Any read or parse
    /// failure leaves the corresponding entry out; the map starts empty on
    /// a totally cold store.
    pub async fn load_from(&self, store: &StateStore) {
        let mut loaded = 0usize;
        for key in store.scan_section("rl").await {
            let Some(suffix) = key.rfind(":rl:").map(|i| &key[i + 4..]) else {
                continue;
            };
            let Some((vendor_raw, model)) = suffix.split_once(':') else {
                continue;
            };
            let Ok(vendor) = vendor_raw.parse::<Vendor>() else {
                continue;
            };
            if let Some(state) = store.load_json::<ModelLimitState>(&key).await {
                self.seed(vendor, model, state);
                loaded += 1;
            }
        }
        if loaded > 0 {
            debug!(entries = loaded, "rate-limit state reloaded from shared store");
        }
    }
}
