//! Vendor rate-limit header parsing.
//!
//! Each vendor reports remaining quota differently; the three extractors
//! here produce one common [`RateLimitSnapshot`]. Header keys are expected
//! lowercased on ingress (the adapters lowercase them when building the
//! reply), so lookups never worry about case drift.
//!
//! The parsing rules are deliberately three independent functions rather
//! than one polymorphic parser; they share nothing but the output shape.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use router_core::Vendor;
use std::collections::HashMap;
use std::time::Duration;

/// Fallback cooldown when a 429 carries no usable `retry-after`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Common shape of a vendor's proactive rate-limit headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    /// Requests left in the current window, if reported.
    pub remaining_requests: Option<u64>,
    /// Tokens left in the current window, if reported.
    pub remaining_tokens: Option<u64>,
    /// Wall-clock instant the request counter resets, if reported.
    pub reset_requests_at: Option<DateTime<Utc>>,
    /// Wall-clock instant the token counter resets, if reported.
    pub reset_tokens_at: Option<DateTime<Utc>>,
}

impl RateLimitSnapshot {
    /// Extract the snapshot for `vendor` from lowercased headers.
    #[must_use]
    pub fn for_vendor(
        vendor: Vendor,
        headers: &HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Self {
        match vendor {
            Vendor::OpenAi => openai_snapshot(headers, now),
            Vendor::Anthropic => anthropic_snapshot(headers),
            Vendor::Google => google_snapshot(),
        }
    }

    /// True when no counter or reset is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining_requests.is_none()
            && self.remaining_tokens.is_none()
            && self.reset_requests_at.is_none()
            && self.reset_tokens_at.is_none()
    }
}

/// OpenAI: counters are integers, resets are relative duration strings of
/// the form `1h2m3s` (fractional seconds allowed) anchored to now.
fn openai_snapshot(headers: &HashMap<String, String>, now: DateTime<Utc>) -> RateLimitSnapshot {
    let reset_at = |key: &str| {
        headers
            .get(key)
            .and_then(|v| parse_reset_duration(v))
            .and_then(|d| ChronoDuration::from_std(d).ok())
            .map(|d| now + d)
    };

    RateLimitSnapshot {
        remaining_requests: parse_u64(headers.get("x-ratelimit-remaining-requests")),
        remaining_tokens: parse_u64(headers.get("x-ratelimit-remaining-tokens")),
        reset_requests_at: reset_at("x-ratelimit-reset-requests"),
        reset_tokens_at: reset_at("x-ratelimit-reset-tokens"),
    }
}

/// Anthropic: counters are integers, resets are ISO-8601 timestamps.
fn anthropic_snapshot(headers: &HashMap<String, String>) -> RateLimitSnapshot {
    let reset_at = |key: &str| {
        headers
            .get(key)
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|t| t.with_timezone(&Utc))
    };

    RateLimitSnapshot {
        remaining_requests: parse_u64(headers.get("anthropic-ratelimit-requests-remaining")),
        remaining_tokens: parse_u64(headers.get("anthropic-ratelimit-tokens-remaining")),
        reset_requests_at: reset_at("anthropic-ratelimit-requests-reset"),
        reset_tokens_at: reset_at("anthropic-ratelimit-tokens-reset"),
    }
}

/// Google emits no proactive rate-limit headers.
fn google_snapshot() -> RateLimitSnapshot {
    RateLimitSnapshot::default()
}

fn parse_u64(value: Option<&String>) -> Option<u64> {
    value.and_then(|v| v.trim().parse().ok())
}

/// Parse an OpenAI reset duration (`1h2m3s`, `6m0.5s`, `59.903s`, `120ms`)
/// into a [`Duration`]. Returns `None` on anything malformed.
#[must_use]
pub fn parse_reset_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let mut total_ms = 0.0_f64;
    let mut chars = input.chars().peekable();

    while chars.peek().is_some() {
        let mut number = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                number.push(c);
                chars.next();
            } else {
                break;
            }
        }

        let mut unit = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_alphabetic() {
                unit.push(c);
                chars.next();
            } else {
                break;
            }
        }

        let value: f64 = number.parse().ok()?;
        let multiplier_ms = match unit.as_str() {
            "h" => 3_600_000.0,
            "m" => 60_000.0,
            "s" => 1_000.0,
            "ms" => 1.0,
            _ => return None,
        };
        total_ms += value * multiplier_ms;
    }

    Some(Duration::from_millis(total_ms.round() as u64))
}

/// Parse a `retry-after` header value: integer seconds or an HTTP-date.
/// Missing or malformed input falls back to [`DEFAULT_RETRY_AFTER`].
#[must_use]
pub fn parse_retry_after(value: Option<&str>, now: DateTime<Utc>) -> Duration {
    let Some(value) = value.map(str::trim) else {
        return DEFAULT_RETRY_AFTER;
    };

    if let Ok(seconds) = value.parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        let until = date.with_timezone(&Utc) - now;
        return until.to_std().unwrap_or(Duration::ZERO);
    }

    DEFAULT_RETRY_AFTER
}
