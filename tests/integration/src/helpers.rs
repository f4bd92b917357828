//! Test server plumbing.

use once_cell::sync::Lazy;
use router_core::{ModelCatalog, Vendor};
use router_providers::{
    AnthropicAdapter, AnthropicConfig, GoogleAdapter, GoogleConfig, OpenAiAdapter, OpenAiConfig,
    ProviderAdapter,
};
use router_queue::{QueueConfig, RequestQueue};
use router_resilience::{CircuitBreakerConfig, RateLimitTracker, VendorBreakers};
use router_routing::Router;
use router_server::{build_router, AppState};
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// The router token every test authenticates with.
pub const ROUTER_KEY: &str = "router-test-key";

static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
});

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// Which mock vendors an app instance talks to, plus knob overrides.
#[derive(Default)]
pub struct AppOptions {
    /// OpenAI mock base URL (without `/v1`).
    pub openai_url: Option<String>,
    /// Anthropic mock base URL.
    pub anthropic_url: Option<String>,
    /// Google mock base URL.
    pub google_url: Option<String>,
    /// Breaker threshold override.
    pub cb_failure_threshold: Option<u32>,
    /// Sync/async queue split override.
    pub queue_async_threshold: Option<Duration>,
    /// Per-job queue deadline override.
    pub queue_timeout: Option<Duration>,
}

/// A running router instance bound to a loopback port.
pub struct TestApp {
    /// Base URL of the instance.
    pub base_url: String,
    /// Client with no default auth; tests add headers explicitly.
    pub client: reqwest::Client,
    /// The shared state, for white-box assertions.
    pub state: AppState,
}

impl TestApp {
    /// POST a JSON body with the router token.
    pub async fn post_json(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}{path}", self.base_url))
            .header("authorization", format!("Bearer {ROUTER_KEY}"))
            .json(body)
            .send()
            .await
            .expect("request should reach the test server")
    }

    /// GET a path without auth headers.
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .expect("request should reach the test server")
    }
}

/// Spawn a router instance wired to the given mock vendors.
pub async fn spawn_app(options: AppOptions) -> TestApp {
    init_tracing();

    let mut adapters: HashMap<Vendor, Arc<dyn ProviderAdapter>> = HashMap::new();
    if let Some(url) = &options.openai_url {
        let config = OpenAiConfig::new("sk-test").with_base_url(format!("{url}/v1"));
        adapters.insert(
            Vendor::OpenAi,
            Arc::new(OpenAiAdapter::new(config).expect("openai adapter")),
        );
    }
    if let Some(url) = &options.anthropic_url {
        let config = AnthropicConfig::new("sk-ant-test").with_base_url(url.clone());
        adapters.insert(
            Vendor::Anthropic,
            Arc::new(AnthropicAdapter::new(config).expect("anthropic adapter")),
        );
    }
    if let Some(url) = &options.google_url {
        let config = GoogleConfig::new("g-test").with_base_url(url.clone());
        adapters.insert(
            Vendor::Google,
            Arc::new(GoogleAdapter::new(config).expect("google adapter")),
        );
    }

    let breakers = Arc::new(VendorBreakers::new(CircuitBreakerConfig {
        failure_threshold: options.cb_failure_threshold.unwrap_or(5),
        cooldown: Duration::from_secs(60),
    }));
    let tracker = Arc::new(RateLimitTracker::new(5));
    let queue = RequestQueue::new(QueueConfig {
        async_threshold: options
            .queue_async_threshold
            .unwrap_or(Duration::from_secs(5)),
        timeout: options.queue_timeout.unwrap_or(Duration::from_secs(30)),
        ..QueueConfig::default()
    });

    let router = Arc::new(Router::new(
        Arc::new(ModelCatalog::builtin()),
        adapters,
        Arc::clone(&breakers),
        Arc::clone(&tracker),
        Arc::clone(&queue),
        vec![Vendor::OpenAi, Vendor::Anthropic, Vendor::Google],
    ));
    Arc::clone(&router).attach_queue();

    let state = AppState {
        router,
        queue,
        breakers,
        tracker,
        router_api_key: SecretString::new(ROUTER_KEY.to_string()),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let app = build_router(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    TestApp {
        base_url: format!("http://{addr}"),
        client: reqwest::Client::new(),
        state,
    }
}

/// A minimal valid chat body for `model`.
#[must_use]
pub fn chat_body(model: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": [{"role": "user", "content": "Hi"}]
    })
}
