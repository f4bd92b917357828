//! # Router Config
//!
//! Environment-driven configuration. The binary exits with code 1 when
//! loading fails: a missing router key, no vendor key at all, or a
//! malformed value are all startup failures, never silent defaults.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use router_core::Vendor;
use secrecy::SecretString;
use std::time::Duration;
use thiserror::Error;

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is absent.
    #[error("{0} is required")]
    Missing(&'static str),

    /// No vendor API key was provided at all.
    #[error("at least one of OPENAI_API_KEY, ANTHROPIC_API_KEY, GOOGLE_API_KEY is required")]
    NoVendorKeys,

    /// A variable failed to parse.
    #[error("invalid value for {name}: {message}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// What went wrong.
        message: String,
    },
}

/// Fully resolved router configuration.
#[derive(Clone)]
pub struct RouterConfig {
    /// Inbound auth token.
    pub router_api_key: SecretString,
    /// OpenAI key, if the vendor is enabled.
    pub openai_api_key: Option<SecretString>,
    /// Anthropic key, if the vendor is enabled.
    pub anthropic_api_key: Option<SecretString>,
    /// Google key, if the vendor is enabled.
    pub google_api_key: Option<SecretString>,
    /// Shared-state Redis URL; distributed state is enabled when set.
    pub redis_url: Option<String>,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Vendor priority order.
    pub provider_priority: Vec<Vendor>,
    /// Queue capacity.
    pub queue_max_size: usize,
    /// Per-job queue deadline.
    pub queue_timeout: Duration,
    /// Sync/async queue split.
    pub queue_async_threshold: Duration,
    /// 5xx count that opens a breaker.
    pub cb_failure_threshold: u32,
    /// Open-breaker duration.
    pub cb_cooldown: Duration,
    /// Proactive rate-limit skip threshold.
    pub rate_limit_low_requests_threshold: u64,
}

impl RouterConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    /// Any missing required variable or malformed value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through a lookup function (tests inject maps here).
    ///
    /// # Errors
    /// Any missing required variable or malformed value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let router_api_key = lookup("ROUTER_API_KEY")
            .filter(|v| !v.trim().is_empty())
            .map(SecretString::new)
            .ok_or(ConfigError::Missing("ROUTER_API_KEY"))?;

        let secret = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::new)
        };
        let openai_api_key = secret("OPENAI_API_KEY");
        let anthropic_api_key = secret("ANTHROPIC_API_KEY");
        let google_api_key = secret("GOOGLE_API_KEY");
        if openai_api_key.is_none() && anthropic_api_key.is_none() && google_api_key.is_none() {
            return Err(ConfigError::NoVendorKeys);
        }

        let provider_priority = parse_priority(
            &lookup("PROVIDER_PRIORITY").unwrap_or_else(|| "openai,anthropic,google".to_string()),
        )?;

        Ok(Self {
            router_api_key,
            openai_api_key,
            anthropic_api_key,
            google_api_key,
            redis_url: lookup("REDIS_URL").filter(|v| !v.trim().is_empty()),
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse(&lookup, "PORT", 3000)?,
            provider_priority,
            queue_max_size: parse(&lookup, "QUEUE_MAX_SIZE", 100)?,
            queue_timeout: Duration::from_millis(parse(&lookup, "QUEUE_TIMEOUT_MS", 30_000)?),
            queue_async_threshold: Duration::from_millis(parse(
                &lookup,
                "QUEUE_ASYNC_THRESHOLD_MS",
                5_000,
            )?),
            cb_failure_threshold: parse(&lookup, "CB_FAILURE_THRESHOLD", 5)?,
            cb_cooldown: Duration::from_millis(parse(&lookup, "CB_COOLDOWN_MS", 60_000)?),
            rate_limit_low_requests_threshold: parse(
                &lookup,
                "RATE_LIMIT_LOW_REQUESTS_THRESHOLD",
                5,
            )?,
        })
    }

    /// Vendors that have an API key configured.
    #[must_use]
    pub fn enabled_vendors(&self) -> Vec<Vendor> {
        let mut vendors = Vec::new();
        if self.openai_api_key.is_some() {
            vendors.push(Vendor::OpenAi);
        }
        if self.anthropic_api_key.is_some() {
            vendors.push(Vendor::Anthropic);
        }
        if self.google_api_key.is_some() {
            vendors.push(Vendor::Google);
        }
        vendors
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            message: e.to_string(),
        }),
    }
}

fn parse_priority(raw: &str) -> Result<Vec<Vendor>, ConfigError> {
    let vendors: Result<Vec<Vendor>, String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect();

    let vendors = vendors.map_err(|message| ConfigError::Invalid {
        name: "PROVIDER_PRIORITY",
        message,
    })?;

    if vendors.is_empty() {
        return Err(ConfigError::Invalid {
            name: "PROVIDER_PRIORITY",
            message: "priority list is empty".to_string(),
        });
    }
    Ok(vendors)
}
