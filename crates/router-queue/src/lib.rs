//! # Router Queue
//!
//! Deferred-retry queue: when the fallback chain is exhausted, requests
//! wait here until the earliest vendor is expected back. Short waits block
//! the caller inline; long waits hand back a job id for polling.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod job;
pub mod queue;

pub use job::{Job, JobOutcome, JobStatus};
pub use queue::{DrainFn, EnqueueOutcome, PollOutcome, QueueConfig, RequestQueue};
