//! Error taxonomy for the router.
//!
//! Every failure that can cross a crate boundary is a [`RouterError`].
//! The routing loop classifies provider failures into "continue to the next
//! candidate" (429 and 5xx, transport) and "surface to the caller" (other
//! 4xx); the accessors here encode that classification in one place.

use crate::types::Vendor;
use std::collections::HashMap;
use thiserror::Error;

/// Result alias used throughout the router crates.
pub type RouterResult<T> = Result<T, RouterError>;

/// All error conditions the router can produce.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The inbound request failed minimal validation.
    #[error("{message}")]
    Validation {
        /// Human-readable description.
        message: String,
        /// Stable machine-readable code for the error envelope.
        code: String,
    },

    /// An upstream vendor answered with a non-2xx status.
    #[error("{vendor} returned status {status}")]
    Provider {
        /// Vendor that produced the response.
        vendor: Vendor,
        /// HTTP status code.
        status: u16,
        /// Response headers, keys lowercased.
        headers: HashMap<String, String>,
        /// Raw response body.
        body: String,
    },

    /// The vendor could not be reached at all.
    #[error("transport failure talking to {vendor}: {message}")]
    Transport {
        /// Vendor we failed to reach.
        vendor: Vendor,
        /// Underlying cause.
        message: String,
    },

    /// Every candidate in the fallback chain was skipped or failed.
    #[error("all providers exhausted")]
    AllProvidersExhausted {
        /// Milliseconds until the earliest candidate is expected back.
        estimated_wait_ms: u64,
    },

    /// The deferred-retry queue is at capacity.
    #[error("queue is full")]
    QueueFull,

    /// A queued job reached its deadline before any vendor recovered.
    #[error("queued request timed out")]
    QueueTimeout,

    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,

    /// The shared state backing failed.
    #[error("shared state error: {0}")]
    Store(String),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A failure that should never surface as anything but a 500.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RouterError {
    /// Build a validation error.
    pub fn validation(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: code.into(),
        }
    }

    /// Build a provider error from a vendor response.
    pub fn provider(
        vendor: Vendor,
        status: u16,
        headers: HashMap<String, String>,
        body: impl Into<String>,
    ) -> Self {
        Self::Provider {
            vendor,
            status,
            headers,
            body: body.into(),
        }
    }

    /// Build a transport error.
    pub fn transport(vendor: Vendor, message: impl Into<String>) -> Self {
        Self::Transport {
            vendor,
            message: message.into(),
        }
    }

    /// Build an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The upstream status code, if this error carries one.
    #[must_use]
    pub fn provider_status(&self) -> Option<u16> {
        match self {
            Self::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the routing loop should move on to the next candidate.
    ///
    /// Rate limiting (429) and server-side failures (5xx, transport) trigger
    /// fallback; any other client error is final for the whole request.
    #[must_use]
    pub fn triggers_fallback(&self) -> bool {
        match self {
            Self::Provider { status, .. } => *status == 429 || *status >= 500,
            Self::Transport { .. } => true,
            _ => false,
        }
    }

    /// Whether this is a 5xx-or-transport failure that counts against a
    /// vendor's circuit breaker. 429 is a cooperation signal, not an outage.
    #[must_use]
    pub fn is_breaker_failure(&self) -> bool {
        match self {
            Self::Provider { status, .. } => *status >= 500,
            Self::Transport { .. } => true,
            _ => false,
        }
    }
}
