//! Queue job types.

use chrono::{DateTime, Utc};
use router_core::Capability;
use serde::{Deserialize, Serialize};

/// A deferred request waiting for a vendor to come back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Job identifier (UUID).
    pub id: String,
    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,
    /// Deadline after which the job expires unprocessed.
    pub timeout_at: DateTime<Utc>,
    /// Wait estimate handed to the client.
    pub estimated_wait_ms: u64,
    /// Request capability.
    pub capability: Capability,
    /// Model the client asked for.
    pub requested_model: String,
    /// The original request body, opaque to the queue.
    pub body: serde_json::Value,
}

impl Job {
    /// Create a job with a fresh id.
    #[must_use]
    pub fn new(
        capability: Capability,
        requested_model: impl Into<String>,
        estimated_wait_ms: u64,
        body: serde_json::Value,
        timeout: std::time::Duration,
    ) -> Self {
        let now = Utc::now();
        let timeout = chrono::Duration::from_std(timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            timeout_at: now + timeout,
            estimated_wait_ms,
            capability,
            requested_model: requested_model.into(),
            body,
        }
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.timeout_at
    }

    /// Time left before the deadline, zero once expired.
    #[must_use]
    pub fn remaining(&self) -> std::time::Duration {
        (self.timeout_at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }
}

/// Lifecycle states of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a drain pass.
    Pending,
    /// A drain pass is executing it.
    Processing,
    /// Completed with a result.
    Done,
    /// Completed with an error.
    Error,
    /// Deadline elapsed before completion.
    Expired,
}

/// Terminal record of a job, retained for polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    /// Terminal status.
    pub status: JobStatus,
    /// Response body for done jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error description for failed jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobOutcome {
    /// A done outcome.
    #[must_use]
    pub fn done(result: serde_json::Value) -> Self {
        Self {
            status: JobStatus::Done,
            result: Some(result),
            error: None,
        }
    }

    /// An error outcome.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Error,
            result: None,
            error: Some(message.into()),
        }
    }

    /// An expired outcome.
    #[must_use]
    pub fn expired() -> Self {
        Self {
            status: JobStatus::Expired,
            result: None,
            error: Some("queue_timeout".to_string()),
        }
    }
}
