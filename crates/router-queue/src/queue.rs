//! The deferred-retry queue.
//!
//! Exhausted requests land here with a wait estimate. Short waits block the
//! caller inline on a completion handle; long waits return a job id the
//! client polls. A debounced timer triggers drain passes that re-enter the
//! router's attempt loop through an injected callback (injected after
//! construction to break the router/queue dependency cycle).
//!
//! When a shared store is configured the async path is persisted: an
//! ordered pending list plus one key per job and result. The pending list
//! is drained with an atomic head pop, so each job is processed by exactly
//! one instance. The sync path stays in-memory since completion handles
//! cannot cross processes.

use crate::job::{Job, JobOutcome, JobStatus};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use router_core::{Capability, RouterError, RouterResult};
use router_resilience::StateStore;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Pause between jobs in a drain pass, so a vendor that just recovered is
/// not hit by the whole backlog at once.
const INTER_JOB_PAUSE: Duration = Duration::from_millis(50);

/// The callback a drain pass runs per job; re-enters the router.
pub type DrainFn =
    Arc<dyn Fn(Job) -> BoxFuture<'static, RouterResult<serde_json::Value>> + Send + Sync>;

/// Queue tuning knobs.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum jobs held at once.
    pub max_size: usize,
    /// Per-job deadline.
    pub timeout: Duration,
    /// Waits at or below this block the caller inline.
    pub async_threshold: Duration,
    /// How long async results are retained locally after completion.
    pub retention: Duration,
    /// Result retention when a shared store holds them.
    pub shared_retention: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            timeout: Duration::from_secs(30),
            async_threshold: Duration::from_secs(5),
            retention: Duration::from_secs(60),
            shared_retention: Duration::from_secs(3600),
        }
    }
}

/// What `enqueue` hands back.
#[derive(Debug)]
pub enum EnqueueOutcome {
    /// The caller was blocked inline; this is the job's result.
    Sync(RouterResult<serde_json::Value>),
    /// The job was accepted for later polling.
    Async {
        /// Job id to poll.
        job_id: String,
        /// Wait estimate in milliseconds.
        estimated_wait_ms: u64,
    },
}

/// What `poll` hands back.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// No such job (never existed, or evicted after retention).
    NotFound,
    /// Still in flight.
    Waiting(JobStatus),
    /// Terminal.
    Finished(JobOutcome),
}

struct Entry {
    job: Job,
    status: JobStatus,
    waiter: Option<oneshot::Sender<RouterResult<serde_json::Value>>>,
}

/// The queue. Constructed as `Arc<RequestQueue>`; drain passes are
/// serialized per instance.
pub struct RequestQueue {
    config: QueueConfig,
    jobs: Mutex<HashMap<String, Entry>>,
    outcomes: Mutex<HashMap<String, JobOutcome>>,
    drain_fn: OnceLock<DrainFn>,
    timer: Mutex<Option<tokio::task::JoinHandle<()>>>,
    drain_gate: tokio::sync::Mutex<()>,
    // Held across the size check and the insert so concurrent enqueues
    // cannot both reserve the last slot.
    capacity_gate: tokio::sync::Mutex<()>,
    store: Option<StateStore>,
    // Handle to ourselves for the timer and eviction tasks.
    handle: Weak<RequestQueue>,
}

impl RequestQueue {
    /// Create an in-memory queue.
    #[must_use]
    pub fn new(config: QueueConfig) -> Arc<Self> {
        Self::build(config, None)
    }

    /// Create a queue whose async path persists to a shared store.
    #[must_use]
    pub fn with_store(config: QueueConfig, store: StateStore) -> Arc<Self> {
        Self::build(config, Some(store))
    }

    fn build(config: QueueConfig, store: Option<StateStore>) -> Arc<Self> {
        Arc::new_cyclic(|handle| Self {
            config,
            jobs: Mutex::new(HashMap::new()),
            outcomes: Mutex::new(HashMap::new()),
            drain_fn: OnceLock::new(),
            timer: Mutex::new(None),
            drain_gate: tokio::sync::Mutex::new(()),
            capacity_gate: tokio::sync::Mutex::new(()),
            store,
            handle: handle.clone(),
        })
    }

    /// Inject the drain callback. Called once, after the router exists.
    pub fn set_drain_handler<F>(&self, handler: F)
    where
        F: Fn(Job) -> BoxFuture<'static, RouterResult<serde_json::Value>>
            + Send
            + Sync
            + 'static,
    {
        let _ = self.drain_fn.set(Arc::new(handler));
    }

    /// Jobs currently held (local plus shared pending).
    pub async fn depth(&self) -> usize {
        let local = self.jobs.lock().len();
        let shared = match &self.store {
            Some(store) => store
                .backend()
                .list_len(&store.queue_pending_key())
                .await
                .unwrap_or(0) as usize,
            None => 0,
        };
        local + shared
    }

    /// Number of jobs waiting in the shared pending list.
    pub async fn shared_pending_len(&self) -> u64 {
        match &self.store {
            Some(store) => store
                .backend()
                .list_len(&store.queue_pending_key())
                .await
                .unwrap_or(0),
            None => 0,
        }
    }

    /// Accept a request whose fallback chain is exhausted.
    ///
    /// Blocks the caller inline when the wait estimate is at or below the
    /// async threshold; otherwise returns a job handle immediately.
    ///
    /// # Errors
    /// [`RouterError::QueueFull`] when at capacity.
    pub async fn enqueue(
        &self,
        capability: Capability,
        requested_model: &str,
        estimated_wait_ms: u64,
        body: serde_json::Value,
    ) -> RouterResult<EnqueueOutcome> {
        let job = Job::new(
            capability,
            requested_model,
            estimated_wait_ms,
            body,
            self.config.timeout,
        );
        let job_id = job.id.clone();
        let delay = Duration::from_millis(estimated_wait_ms);
        let inline = delay <= self.config.async_threshold;

        // Size check and insert happen under one gate; the check alone has
        // an await in it, and two enqueues racing past it could otherwise
        // both take the last slot.
        let waiter = {
            let _capacity = self.capacity_gate.lock().await;
            if self.depth().await >= self.config.max_size {
                warn!(max_size = self.config.max_size, "queue is full, rejecting");
                return Err(RouterError::QueueFull);
            }

            if inline {
                let (tx, rx) = oneshot::channel();
                self.jobs.lock().insert(
                    job_id.clone(),
                    Entry {
                        job,
                        status: JobStatus::Pending,
                        waiter: Some(tx),
                    },
                );
                Some(rx)
            } else if let Some(store) = &self.store {
                let payload = serde_json::to_string(&job)
                    .map_err(|e| RouterError::internal(format!("job serialization: {e}")))?;
                let ttl = self.config.timeout + self.config.shared_retention;
                store
                    .backend()
                    .set_ex(&store.queue_job_key(&job_id), &payload, ttl)
                    .await?;
                store
                    .backend()
                    .list_push(&store.queue_pending_key(), &job_id)
                    .await?;
                None
            } else {
                self.jobs.lock().insert(
                    job_id.clone(),
                    Entry {
                        job,
                        status: JobStatus::Pending,
                        waiter: None,
                    },
                );
                None
            }
        };

        if let Some(rx) = waiter {
            info!(job_id = %job_id, wait_ms = estimated_wait_ms, "holding caller inline");
            self.schedule_processing(estimated_wait_ms as i64);

            let result = match rx.await {
                Ok(result) => result,
                Err(_) => Err(RouterError::internal("queue dropped the job")),
            };
            return Ok(EnqueueOutcome::Sync(result));
        }

        info!(job_id = %job_id, wait_ms = estimated_wait_ms, "job accepted for polling");
        self.schedule_processing(estimated_wait_ms as i64);

        Ok(EnqueueOutcome::Async {
            job_id,
            estimated_wait_ms,
        })
    }

    /// Look up a job by id. A pending job whose deadline has already passed
    /// reports (and transitions to) expired here rather than waiting for
    /// the next drain pass to notice.
    pub async fn poll(&self, job_id: &str) -> PollOutcome {
        if let Some(outcome) = self.outcomes.lock().get(job_id).cloned() {
            return PollOutcome::Finished(outcome);
        }

        let expired_entry = {
            let mut jobs = self.jobs.lock();
            match jobs.get(job_id) {
                Some(entry) if entry.status == JobStatus::Pending && entry.job.is_expired() => {
                    jobs.remove(job_id)
                }
                Some(entry) => return PollOutcome::Waiting(entry.status),
                None => None,
            }
        };
        if let Some(entry) = expired_entry {
            if let Some(tx) = entry.waiter {
                let _ = tx.send(Err(RouterError::QueueTimeout));
            }
            let outcome = JobOutcome::expired();
            self.retain_outcome(job_id.to_string(), outcome.clone());
            return PollOutcome::Finished(outcome);
        }

        if let Some(store) = &self.store {
            if let Some(outcome) = store
                .load_json::<JobOutcome>(&store.queue_result_key(job_id))
                .await
            {
                return PollOutcome::Finished(outcome);
            }
            if let Some(job) = store.load_json::<Job>(&store.queue_job_key(job_id)).await {
                if job.is_expired() {
                    return PollOutcome::Finished(JobOutcome::expired());
                }
                return PollOutcome::Waiting(JobStatus::Pending);
            }
        }
        PollOutcome::NotFound
    }

    /// Debounce the drain timer: any pending timer is cleared and replaced.
    /// Negative delays are clamped to zero.
    pub fn schedule_processing(&self, delay_ms: i64) {
        let Some(queue) = self.handle.upgrade() else {
            return;
        };
        let delay = Duration::from_millis(delay_ms.max(0) as u64);
        let mut timer = self.timer.lock();
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.drain().await;
        }));
    }

    /// Run one drain pass. Only one pass executes at a time per instance.
    pub async fn drain(&self) {
        let _gate = self.drain_gate.lock().await;
        let Some(drain_fn) = self.drain_fn.get().cloned() else {
            warn!("drain requested before a handler was injected");
            return;
        };

        let mut pending: Vec<Job> = {
            let jobs = self.jobs.lock();
            jobs.values()
                .filter(|entry| entry.status == JobStatus::Pending)
                .map(|entry| entry.job.clone())
                .collect()
        };
        pending.sort_by_key(|job| job.created_at);

        debug!(jobs = pending.len(), "drain pass starting");
        let mut first = true;
        for job in pending {
            if !std::mem::take(&mut first) {
                tokio::time::sleep(INTER_JOB_PAUSE).await;
            }
            self.process_local(&drain_fn, job).await;
        }

        if let Some(store) = self.store.clone() {
            // Bound the pops to the list length observed at entry so a job
            // requeued mid-pass is not popped again in the same pass.
            let pending_key = store.queue_pending_key();
            let backlog = store.backend().list_len(&pending_key).await.unwrap_or(0);
            for _ in 0..backlog {
                let Ok(Some(id)) = store.backend().list_pop(&pending_key).await else {
                    break;
                };
                let Some(job) = store.load_json::<Job>(&store.queue_job_key(&id)).await else {
                    continue;
                };
                if !std::mem::take(&mut first) {
                    tokio::time::sleep(INTER_JOB_PAUSE).await;
                }
                self.process_shared(&store, &drain_fn, job).await;
            }
        }
    }

    async fn process_local(&self, drain_fn: &DrainFn, job: Job) {
        let id = job.id.clone();

        if job.is_expired() {
            if let Some(entry) = self.jobs.lock().remove(&id) {
                match entry.waiter {
                    Some(tx) => {
                        let _ = tx.send(Err(RouterError::QueueTimeout));
                    }
                    None => self.retain_outcome(id.clone(), JobOutcome::expired()),
                }
            }
            warn!(job_id = %id, "job expired before processing");
            return;
        }

        {
            let mut jobs = self.jobs.lock();
            let Some(entry) = jobs.get_mut(&id) else {
                return;
            };
            entry.status = JobStatus::Processing;
        }

        let result = match tokio::time::timeout(job.remaining(), drain_fn(job.clone())).await {
            Ok(result) => result,
            Err(_) => Err(RouterError::QueueTimeout),
        };

        // Providers still exhausted and the deadline hasn't passed: put the
        // job back and wake up when the chain is expected to recover.
        if let Err(RouterError::AllProvidersExhausted { estimated_wait_ms }) = &result {
            if !job.is_expired() {
                let wait = (*estimated_wait_ms).min(job.remaining().as_millis() as u64);
                if let Some(entry) = self.jobs.lock().get_mut(&id) {
                    entry.status = JobStatus::Pending;
                }
                debug!(job_id = %id, wait_ms = wait, "providers still exhausted, requeued");
                self.schedule_processing(wait as i64);
                return;
            }
        }

        let Some(entry) = self.jobs.lock().remove(&id) else {
            return;
        };
        match entry.waiter {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => {
                let outcome = match result {
                    Ok(value) => JobOutcome::done(value),
                    Err(RouterError::QueueTimeout) => JobOutcome::expired(),
                    Err(e) => JobOutcome::error(e.to_string()),
                };
                self.retain_outcome(id, outcome);
            }
        }
    }

    async fn process_shared(&self, store: &StateStore, drain_fn: &DrainFn, job: Job) {
        let id = job.id.clone();

        if job.is_expired() {
            let _ = store.backend().delete(&store.queue_job_key(&id)).await;
            store.write_json_detached(
                store.queue_result_key(&id),
                &JobOutcome::expired(),
                self.config.shared_retention,
            );
            warn!(job_id = %id, "shared job expired before processing");
            return;
        }

        let result = match tokio::time::timeout(job.remaining(), drain_fn(job.clone())).await {
            Ok(result) => result,
            Err(_) => Err(RouterError::QueueTimeout),
        };

        if let Err(RouterError::AllProvidersExhausted { estimated_wait_ms }) = &result {
            if !job.is_expired() {
                let wait = (*estimated_wait_ms).min(job.remaining().as_millis() as u64);
                let _ = store
                    .backend()
                    .list_push(&store.queue_pending_key(), &id)
                    .await;
                self.schedule_processing(wait as i64);
                return;
            }
        }

        let outcome = match result {
            Ok(value) => JobOutcome::done(value),
            Err(RouterError::QueueTimeout) => JobOutcome::expired(),
            Err(e) => JobOutcome::error(e.to_string()),
        };
        let _ = store.backend().delete(&store.queue_job_key(&id)).await;
        store.write_json_detached(
            store.queue_result_key(&id),
            &outcome,
            self.config.shared_retention,
        );
    }

    /// Keep a terminal outcome around for polling, then evict it.
    fn retain_outcome(&self, id: String, outcome: JobOutcome) {
        self.outcomes.lock().insert(id.clone(), outcome);
        let queue = self.handle.clone();
        let retention = self.config.retention;
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            if let Some(queue) = queue.upgrade() {
                queue.outcomes.lock().remove(&id);
            }
        });
    }
}
