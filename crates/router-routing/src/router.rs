//! The routing attempt loop.

use crate::chain::{build_fallback_chain, Candidate};
use chrono::Utc;
use router_core::{Capability, ModelCatalog, RouterError, RouterResult, Vendor};
use router_providers::{AdapterReply, AdapterRequest, ProviderAdapter, ReplyBody};
use router_queue::{EnqueueOutcome, RequestQueue};
use router_resilience::{RateLimitTracker, VendorBreakers};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A completed routed call.
#[derive(Debug)]
pub struct RoutedResponse {
    /// Vendor that served the request.
    pub vendor: Vendor,
    /// Vendor-side model name actually dialed.
    pub vendor_model: String,
    /// Model name the client asked for.
    pub requested_model: String,
    /// The translated vendor reply.
    pub reply: AdapterReply,
}

/// What `execute` hands back.
#[derive(Debug)]
pub enum ExecuteOutcome {
    /// Served within this call (directly or via the sync queue path).
    Completed(RoutedResponse),
    /// Accepted for deferred processing; the client polls.
    Queued {
        /// Job id to poll.
        job_id: String,
        /// Wait estimate in milliseconds.
        estimated_wait_ms: u64,
    },
}

/// Serialized result of a drained queue job.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueuedResult {
    /// Vendor that eventually served the job.
    pub vendor: Vendor,
    /// Vendor-side model name used.
    pub vendor_model: String,
    /// Translated response body.
    pub response: serde_json::Value,
}

/// The router: owns the catalog, the adapters, and the shared guards, and
/// drives every request through the fallback chain.
pub struct Router {
    catalog: Arc<ModelCatalog>,
    adapters: HashMap<Vendor, Arc<dyn ProviderAdapter>>,
    breakers: Arc<VendorBreakers>,
    tracker: Arc<RateLimitTracker>,
    queue: Arc<RequestQueue>,
    priority: Vec<Vendor>,
}

impl Router {
    /// Assemble the router.
    #[must_use]
    pub fn new(
        catalog: Arc<ModelCatalog>,
        adapters: HashMap<Vendor, Arc<dyn ProviderAdapter>>,
        breakers: Arc<VendorBreakers>,
        tracker: Arc<RateLimitTracker>,
        queue: Arc<RequestQueue>,
        priority: Vec<Vendor>,
    ) -> Self {
        Self {
            catalog,
            adapters,
            breakers,
            tracker,
            queue,
            priority,
        }
    }

    /// The model catalog.
    #[must_use]
    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Vendors with a registered adapter, in priority order.
    #[must_use]
    pub fn registered_vendors(&self) -> Vec<Vendor> {
        self.priority
            .iter()
            .copied()
            .filter(|v| self.adapters.contains_key(v))
            .collect()
    }

    /// Wire the queue's drain callback back into this router. Called once
    /// after construction; breaks the router/queue dependency cycle.
    pub fn attach_queue(self: Arc<Self>) {
        let queue = Arc::clone(&self.queue);
        queue.set_drain_handler(move |job| {
            let router = Arc::clone(&self);
            Box::pin(async move {
                // Queued results are delivered as stored JSON, so a deferred
                // streaming request is retried unary.
                let mut body = job.body;
                if body.get("stream").is_some() {
                    body["stream"] = serde_json::Value::Bool(false);
                }

                let cancel = CancellationToken::new();
                let routed = router
                    .try_chain(&job.requested_model, job.capability, &cancel, &body)
                    .await?;

                let ReplyBody::Json(response) = routed.reply.body else {
                    return Err(RouterError::internal(
                        "drained job produced a streaming body",
                    ));
                };
                serde_json::to_value(QueuedResult {
                    vendor: routed.vendor,
                    vendor_model: routed.vendor_model,
                    response,
                })
                .map_err(|e| RouterError::internal(format!("result serialization: {e}")))
            })
        });
    }

    /// Route one request through the fallback chain, deferring to the queue
    /// when every candidate is rate limited or broken.
    ///
    /// Safe to call from any number of tasks concurrently; all shared state
    /// lives in the breaker, tracker, and queue.
    ///
    /// # Errors
    /// Client-fatal vendor errors (4xx other than 429), cancellation, queue
    /// rejection, and queue timeouts surface here.
    pub async fn execute(
        &self,
        requested_model: &str,
        capability: Capability,
        cancel: &CancellationToken,
        body: serde_json::Value,
    ) -> RouterResult<ExecuteOutcome> {
        match self
            .try_chain(requested_model, capability, cancel, &body)
            .await
        {
            Ok(routed) => Ok(ExecuteOutcome::Completed(routed)),
            Err(RouterError::AllProvidersExhausted { estimated_wait_ms }) => {
                info!(
                    model = %requested_model,
                    estimated_wait_ms,
                    "all providers exhausted, deferring to queue"
                );
                match self
                    .queue
                    .enqueue(capability, requested_model, estimated_wait_ms, body)
                    .await?
                {
                    EnqueueOutcome::Sync(result) => {
                        let queued: QueuedResult = serde_json::from_value(result?)
                            .map_err(|e| RouterError::internal(format!("queue result: {e}")))?;
                        Ok(ExecuteOutcome::Completed(RoutedResponse {
                            vendor: queued.vendor,
                            vendor_model: queued.vendor_model,
                            requested_model: requested_model.to_string(),
                            reply: AdapterReply::json(200, HashMap::new(), queued.response),
                        }))
                    }
                    EnqueueOutcome::Async {
                        job_id,
                        estimated_wait_ms,
                    } => Ok(ExecuteOutcome::Queued {
                        job_id,
                        estimated_wait_ms,
                    }),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// One pass over the fallback chain, without queue dispatch. Also the
    /// body of the queue's drain callback.
    async fn try_chain(
        &self,
        requested_model: &str,
        capability: Capability,
        cancel: &CancellationToken,
        body: &serde_json::Value,
    ) -> RouterResult<RoutedResponse> {
        let registered = self.registered_vendors();
        let chain =
            build_fallback_chain(&self.catalog, &self.priority, &registered, requested_model);

        if chain.is_empty() {
            return Err(RouterError::validation(
                format!("no configured vendor can serve model {requested_model}"),
                "model_not_available",
            ));
        }

        for (position, candidate) in chain.iter().enumerate() {
            let Candidate { vendor, model, .. } = candidate;
            let adapter = self
                .adapters
                .get(vendor)
                .ok_or_else(|| RouterError::internal(format!("no adapter for {vendor}")))?;

            let breaker = self.breakers.get_or_create(*vendor);
            if !breaker.is_available() {
                debug!(vendor = %vendor, model = %model, "skipping, circuit open");
                continue;
            }
            if self.tracker.should_avoid(*vendor, model) {
                debug!(vendor = %vendor, model = %model, "skipping, rate limited");
                continue;
            }

            let request = AdapterRequest {
                capability,
                requested_model,
                vendor_model: model,
                body,
            };

            match adapter.call(request, cancel).await {
                Ok(reply) => {
                    self.tracker.update(*vendor, model, reply.status, &reply.headers);
                    breaker.record_success();

                    if position > 0 {
                        warn!(
                            requested_model = %requested_model,
                            vendor = %vendor,
                            vendor_model = %model,
                            tier = ?candidate.tier,
                            "request served by fallback vendor"
                        );
                    }

                    return Ok(RoutedResponse {
                        vendor: *vendor,
                        vendor_model: model.clone(),
                        requested_model: requested_model.to_string(),
                        reply,
                    });
                }
                Err(RouterError::Cancelled) => return Err(RouterError::Cancelled),
                Err(error) => {
                    if let RouterError::Provider {
                        status, headers, ..
                    } = &error
                    {
                        self.tracker.update(*vendor, model, *status, headers);
                    }
                    if error.is_breaker_failure() {
                        breaker.record_failure();
                    }

                    if error.triggers_fallback() {
                        debug!(
                            vendor = %vendor,
                            model = %model,
                            error = %error,
                            "candidate failed, trying next"
                        );
                        continue;
                    }

                    // Non-429 4xx: the request itself is at fault.
                    return Err(error);
                }
            }
        }

        let earliest = self
            .tracker
            .earliest_available(chain.iter().map(|c| (c.vendor, c.model.as_str())));
        let estimated_wait_ms = (earliest - Utc::now()).num_milliseconds().max(0) as u64;

        Err(RouterError::AllProvidersExhausted { estimated_wait_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use router_queue::QueueConfig;
    use router_resilience::{CircuitBreakerConfig, CircuitState};
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Adapter that replays a scripted sequence of outcomes.
    struct ScriptedAdapter {
        vendor: Vendor,
        script: Mutex<VecDeque<RouterResult<AdapterReply>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedAdapter {
        fn new(vendor: Vendor, script: Vec<RouterResult<AdapterReply>>) -> Arc<Self> {
            Arc::new(Self {
                vendor,
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn ok_reply(body: serde_json::Value) -> RouterResult<AdapterReply> {
            Ok(AdapterReply::json(200, HashMap::new(), body))
        }

        fn err_reply(vendor: Vendor, status: u16, headers: &[(&str, &str)]) -> RouterResult<AdapterReply> {
            Err(RouterError::provider(
                vendor,
                status,
                headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                "{}",
            ))
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn vendor(&self) -> Vendor {
            self.vendor
        }

        async fn call(
            &self,
            request: AdapterRequest<'_>,
            _cancel: &CancellationToken,
        ) -> RouterResult<AdapterReply> {
            self.calls.lock().push(request.vendor_model.to_string());
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Self::ok_reply(serde_json::json!({"default": true})))
        }
    }

    struct Fixture {
        router: Arc<Router>,
        breakers: Arc<VendorBreakers>,
        tracker: Arc<RateLimitTracker>,
    }

    fn fixture(adapters: Vec<Arc<ScriptedAdapter>>, threshold: u32) -> Fixture {
        let breakers = Arc::new(VendorBreakers::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown: Duration::from_secs(60),
        }));
        let tracker = Arc::new(RateLimitTracker::new(5));
        let queue = RequestQueue::new(QueueConfig {
            async_threshold: Duration::from_millis(100),
            ..QueueConfig::default()
        });

        let map: HashMap<Vendor, Arc<dyn ProviderAdapter>> = adapters
            .into_iter()
            .map(|a| (a.vendor(), a as Arc<dyn ProviderAdapter>))
            .collect();

        let router = Arc::new(Router::new(
            Arc::new(ModelCatalog::builtin()),
            map,
            Arc::clone(&breakers),
            Arc::clone(&tracker),
            queue,
            vec![Vendor::OpenAi, Vendor::Anthropic, Vendor::Google],
        ));
        Arc::clone(&router).attach_queue();

        Fixture {
            router,
            breakers,
            tracker,
        }
    }

    fn chat_body() -> serde_json::Value {
        serde_json::json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "Hi"}]
        })
    }

    #[tokio::test]
    async fn test_first_candidate_success() {
        let openai = ScriptedAdapter::new(
            Vendor::OpenAi,
            vec![ScriptedAdapter::ok_reply(serde_json::json!({"id": "1"}))],
        );
        let fx = fixture(vec![Arc::clone(&openai)], 5);

        let outcome = fx
            .router
            .execute("gpt-4o", Capability::Chat, &CancellationToken::new(), chat_body())
            .await
            .expect("execute");

        let ExecuteOutcome::Completed(routed) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(routed.vendor, Vendor::OpenAi);
        assert_eq!(routed.vendor_model, "gpt-4o");
        assert_eq!(openai.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_on_429_and_cooldown_recorded() {
        let openai = ScriptedAdapter::new(
            Vendor::OpenAi,
            vec![ScriptedAdapter::err_reply(
                Vendor::OpenAi,
                429,
                &[("retry-after", "30")],
            )],
        );
        let anthropic = ScriptedAdapter::new(
            Vendor::Anthropic,
            vec![ScriptedAdapter::ok_reply(serde_json::json!({"id": "2"}))],
        );
        let fx = fixture(vec![openai, Arc::clone(&anthropic)], 5);

        let outcome = fx
            .router
            .execute("gpt-4o", Capability::Chat, &CancellationToken::new(), chat_body())
            .await
            .expect("execute");

        let ExecuteOutcome::Completed(routed) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(routed.vendor, Vendor::Anthropic);
        assert_eq!(routed.vendor_model, "claude-opus-4-6");
        assert_eq!(anthropic.calls.lock()[0], "claude-opus-4-6");

        // The 429 left (openai, gpt-4o) cooling for ~30s.
        let state = fx.tracker.state(Vendor::OpenAi, "gpt-4o").expect("state");
        assert!(state.cooling_down);
        // 429 does not move the breaker.
        assert_eq!(
            fx.breakers.get_or_create(Vendor::OpenAi).state(),
            CircuitState::Closed
        );
    }

    #[tokio::test]
    async fn test_circuit_opens_and_is_skipped() {
        let openai = ScriptedAdapter::new(
            Vendor::OpenAi,
            vec![
                ScriptedAdapter::err_reply(Vendor::OpenAi, 500, &[]),
                ScriptedAdapter::err_reply(Vendor::OpenAi, 500, &[]),
                ScriptedAdapter::err_reply(Vendor::OpenAi, 500, &[]),
            ],
        );
        let anthropic = ScriptedAdapter::new(Vendor::Anthropic, vec![]);
        let fx = fixture(vec![Arc::clone(&openai), Arc::clone(&anthropic)], 3);

        for _ in 0..3 {
            let _ = fx
                .router
                .execute("gpt-4o", Capability::Chat, &CancellationToken::new(), chat_body())
                .await;
        }
        assert_eq!(
            fx.breakers.get_or_create(Vendor::OpenAi).state(),
            CircuitState::Open
        );
        assert_eq!(openai.calls.lock().len(), 3);

        // The next request must skip openai entirely.
        let outcome = fx
            .router
            .execute("gpt-4o", Capability::Chat, &CancellationToken::new(), chat_body())
            .await
            .expect("execute");
        let ExecuteOutcome::Completed(routed) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(routed.vendor, Vendor::Anthropic);
        assert_eq!(openai.calls.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_client_error_propagates_without_fallback() {
        let openai = ScriptedAdapter::new(
            Vendor::OpenAi,
            vec![ScriptedAdapter::err_reply(Vendor::OpenAi, 400, &[])],
        );
        let anthropic = ScriptedAdapter::new(Vendor::Anthropic, vec![]);
        let fx = fixture(vec![openai, Arc::clone(&anthropic)], 5);

        let err = fx
            .router
            .execute("gpt-4o", Capability::Chat, &CancellationToken::new(), chat_body())
            .await
            .expect_err("client error");

        assert_eq!(err.provider_status(), Some(400));
        assert!(anthropic.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_chain_takes_sync_queue_path() {
        // Both vendors rate limited with a tiny cooldown: the queue holds
        // the caller inline, the drain retries, and the retry lands on the
        // recovered first vendor.
        let openai = ScriptedAdapter::new(
            Vendor::OpenAi,
            vec![
                ScriptedAdapter::err_reply(Vendor::OpenAi, 429, &[("retry-after", "0")]),
                ScriptedAdapter::ok_reply(serde_json::json!({"id": "recovered"})),
            ],
        );
        let anthropic = ScriptedAdapter::new(
            Vendor::Anthropic,
            vec![ScriptedAdapter::err_reply(
                Vendor::Anthropic,
                429,
                &[("retry-after", "0")],
            )],
        );
        let fx = fixture(vec![Arc::clone(&openai), anthropic], 5);

        let outcome = fx
            .router
            .execute("gpt-4o", Capability::Chat, &CancellationToken::new(), chat_body())
            .await
            .expect("execute");

        let ExecuteOutcome::Completed(routed) = outcome else {
            panic!("expected sync queue completion");
        };
        assert_eq!(routed.vendor, Vendor::OpenAi);
        let ReplyBody::Json(body) = routed.reply.body else {
            panic!("expected json body");
        };
        assert_eq!(body["id"], "recovered");
    }

    #[tokio::test]
    async fn test_unknown_model_best_effort_route() {
        let openai = ScriptedAdapter::new(
            Vendor::OpenAi,
            vec![ScriptedAdapter::ok_reply(serde_json::json!({"id": "raw"}))],
        );
        let fx = fixture(vec![Arc::clone(&openai)], 5);

        let outcome = fx
            .router
            .execute(
                "experimental-model",
                Capability::Chat,
                &CancellationToken::new(),
                chat_body(),
            )
            .await
            .expect("execute");

        let ExecuteOutcome::Completed(routed) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(routed.vendor_model, "experimental-model");
        assert_eq!(openai.calls.lock()[0], "experimental-model");
    }

    #[tokio::test]
    async fn test_empty_chain_is_client_fatal() {
        let fx = fixture(vec![], 5);
        let err = fx
            .router
            .execute("gpt-4o", Capability::Chat, &CancellationToken::new(), chat_body())
            .await
            .expect_err("no vendors");
        assert!(matches!(err, RouterError::Validation { .. }));
    }
}
