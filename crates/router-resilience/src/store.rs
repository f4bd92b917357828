//! Shared KV backing for multi-instance deployments.
//!
//! A [`KvStore`] abstracts the handful of operations the breaker, tracker,
//! and queue need from a shared store: TTL'd string values, prefix scans,
//! and an atomically-popped list. [`RedisStore`] is the production backend;
//! [`MemoryStore`] backs tests and single-instance runs.
//!
//! All write-through traffic is fire-and-forget: a failed write logs at
//! debug and never propagates into the request path.

use async_trait::async_trait;
use router_core::{RouterError, RouterResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Minimal KV interface shared state rides on.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a value.
    async fn get(&self, key: &str) -> RouterResult<Option<String>>;

    /// Set a value with a TTL.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> RouterResult<()>;

    /// Delete a key.
    async fn delete(&self, key: &str) -> RouterResult<()>;

    /// All keys matching a glob pattern (e.g. `prefix:rl:*`).
    async fn scan(&self, pattern: &str) -> RouterResult<Vec<String>>;

    /// Append to the tail of a list.
    async fn list_push(&self, key: &str, value: &str) -> RouterResult<()>;

    /// Atomically pop the head of a list.
    async fn list_pop(&self, key: &str) -> RouterResult<Option<String>>;

    /// Length of a list.
    async fn list_len(&self, key: &str) -> RouterResult<u64>;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}

/// In-memory [`KvStore`] with TTL expiry.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, (String, Instant)>>,
    lists: RwLock<HashMap<String, VecDeque<String>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> RouterResult<Option<String>> {
        let values = self.values.read().await;
        Ok(values
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(v, _)| v.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> RouterResult<()> {
        let mut values = self.values.write().await;
        values.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> RouterResult<()> {
        self.values.write().await.remove(key);
        self.lists.write().await.remove(key);
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> RouterResult<Vec<String>> {
        let prefix = pattern.trim_end_matches('*');
        let now = Instant::now();
        let values = self.values.read().await;
        Ok(values
            .iter()
            .filter(|(k, (_, expires))| k.starts_with(prefix) && *expires > now)
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn list_push(&self, key: &str, value: &str) -> RouterResult<()> {
        let mut lists = self.lists.write().await;
        lists
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
        Ok(())
    }

    async fn list_pop(&self, key: &str) -> RouterResult<Option<String>> {
        let mut lists = self.lists.write().await;
        Ok(lists.get_mut(key).and_then(VecDeque::pop_front))
    }

    async fn list_len(&self, key: &str) -> RouterResult<u64> {
        let lists = self.lists.read().await;
        Ok(lists.get(key).map_or(0, |l| l.len() as u64))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Redis-backed [`KvStore`] using a managed multiplexed connection.
pub struct RedisStore {
    manager: redis::aio::ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis at `url`.
    ///
    /// # Errors
    /// Returns a store error when the URL is invalid or the initial
    /// connection fails.
    pub async fn connect(url: &str) -> RouterResult<Self> {
        let client =
            redis::Client::open(url).map_err(|e| RouterError::Store(format!("redis url: {e}")))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| RouterError::Store(format!("redis connect: {e}")))?;

        info!("connected to redis shared state");
        Ok(Self { manager })
    }
}

fn store_err(e: redis::RedisError) -> RouterError {
    RouterError::Store(e.to_string())
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> RouterResult<Option<String>> {
        let mut con = self.manager.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut con)
            .await
            .map_err(store_err)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> RouterResult<()> {
        let mut con = self.manager.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut con)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> RouterResult<()> {
        let mut con = self.manager.clone();
        let _: () = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut con)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> RouterResult<Vec<String>> {
        let mut con = self.manager.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, mut batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut con)
                .await
                .map_err(store_err)?;
            keys.append(&mut batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }

    async fn list_push(&self, key: &str, value: &str) -> RouterResult<()> {
        let mut con = self.manager.clone();
        let _: () = redis::cmd("RPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut con)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn list_pop(&self, key: &str) -> RouterResult<Option<String>> {
        let mut con = self.manager.clone();
        redis::cmd("LPOP")
            .arg(key)
            .query_async(&mut con)
            .await
            .map_err(store_err)
    }

    async fn list_len(&self, key: &str) -> RouterResult<u64> {
        let mut con = self.manager.clone();
        redis::cmd("LLEN")
            .arg(key)
            .query_async(&mut con)
            .await
            .map_err(store_err)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// A prefixed view over a [`KvStore`] with the key layout and
/// fire-and-forget write helpers the breaker, tracker, and queue share.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<dyn KvStore>,
    prefix: String,
}

impl StateStore {
    /// Wrap a backend under a key prefix.
    pub fn new(inner: Arc<dyn KvStore>, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    /// The underlying backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn KvStore> {
        &self.inner
    }

    /// Key for a vendor's breaker state.
    #[must_use]
    pub fn breaker_key(&self, vendor: &str) -> String {
        format!("{}:cb:{vendor}", self.prefix)
    }

    /// Key for a (vendor, model) rate-limit state.
    #[must_use]
    pub fn limit_key(&self, vendor: &str, model: &str) -> String {
        format!("{}:rl:{vendor}:{model}", self.prefix)
    }

    /// Key of the pending-job id list.
    #[must_use]
    pub fn queue_pending_key(&self) -> String {
        format!("{}:queue:pending", self.prefix)
    }

    /// Key of a persisted job.
    #[must_use]
    pub fn queue_job_key(&self, id: &str) -> String {
        format!("{}:queue:job:{id}", self.prefix)
    }

    /// Key of a persisted job result.
    #[must_use]
    pub fn queue_result_key(&self, id: &str) -> String {
        format!("{}:queue:result:{id}", self.prefix)
    }

    /// Serialize `value` and write it with `ttl` on a detached task.
    /// Failures log at debug and are otherwise dropped.
    pub fn write_json_detached<T: Serialize>(&self, key: String, value: &T, ttl: Duration) {
        let payload = match serde_json::to_string(value) {
            Ok(p) => p,
            Err(e) => {
                debug!(key = %key, error = %e, "skipping shared-state write, serialization failed");
                return;
            }
        };
        let store = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = store.set_ex(&key, &payload, ttl).await {
                debug!(key = %key, error = %e, "shared-state write failed");
            }
        });
    }

    /// Read and deserialize a JSON value; malformed entries read as absent.
    pub async fn load_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.inner.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    debug!(key = %key, error = %e, "skipping malformed shared-state entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                debug!(key = %key, error = %e, "shared-state read failed");
                None
            }
        }
    }

    /// Keys under `{prefix}:{section}:*`. Errors read as an empty list so a
    /// cold or unreachable store degrades to empty in-memory state.
    pub async fn scan_section(&self, section: &str) -> Vec<String> {
        let pattern = format!("{}:{section}:*", self.prefix);
        match self.inner.scan(&pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                debug!(pattern = %pattern, error = %e, "shared-state scan failed");
                Vec::new()
            }
        }
    }
}
