//! # llm-router
//!
//! Reverse proxy fronting OpenAI, Anthropic, and Google Gemini behind a
//! single OpenAI-compatible wire contract, with rate-limit-aware failover,
//! per-vendor circuit breaking, and a deferred-retry queue.
//!
//! ```bash
//! ROUTER_API_KEY=secret OPENAI_API_KEY=sk-... llm-router
//! ```

use anyhow::Context;
use router_config::RouterConfig;
use router_core::{ModelCatalog, Vendor};
use router_providers::{
    AnthropicAdapter, AnthropicConfig, GoogleAdapter, GoogleConfig, OpenAiAdapter, OpenAiConfig,
    ProviderAdapter,
};
use router_queue::{QueueConfig, RequestQueue};
use router_resilience::{
    CircuitBreakerConfig, RateLimitTracker, RedisStore, StateStore, VendorBreakers,
};
use router_routing::Router;
use router_server::AppState;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting llm-router");

    let config = match RouterConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration failure");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        error!(error = %e, "router failed");
        std::process::exit(1);
    }
}

async fn run(config: RouterConfig) -> anyhow::Result<()> {
    // Shared state backing, when configured.
    let store = match &config.redis_url {
        Some(url) => match RedisStore::connect(url).await {
            Ok(store) => Some(StateStore::new(Arc::new(store), "llm-router")),
            Err(e) => {
                // Degrade to in-memory state rather than refusing to start.
                warn!(error = %e, "redis unavailable, running with local state only");
                None
            }
        },
        None => None,
    };

    let adapters = build_adapters(&config)?;
    info!(
        vendors = ?adapters.keys().map(Vendor::as_str).collect::<Vec<_>>(),
        "vendor adapters registered"
    );

    let mut breakers = VendorBreakers::new(CircuitBreakerConfig {
        failure_threshold: config.cb_failure_threshold,
        cooldown: config.cb_cooldown,
    });
    let mut tracker = RateLimitTracker::new(config.rate_limit_low_requests_threshold);
    let queue_config = QueueConfig {
        max_size: config.queue_max_size,
        timeout: config.queue_timeout,
        async_threshold: config.queue_async_threshold,
        ..QueueConfig::default()
    };
    let queue = match &store {
        Some(shared) => RequestQueue::with_store(queue_config, shared.clone()),
        None => RequestQueue::new(queue_config),
    };

    if let Some(shared) = &store {
        breakers = breakers.with_store(shared.clone());
        tracker = tracker.with_store(shared.clone());
    }

    let breakers = Arc::new(breakers);
    let tracker = Arc::new(tracker);

    if let Some(store) = &store {
        breakers.load_from(store).await;
        tracker.load_from(store).await;
    }

    let router = Arc::new(Router::new(
        Arc::new(ModelCatalog::builtin()),
        adapters,
        Arc::clone(&breakers),
        Arc::clone(&tracker),
        Arc::clone(&queue),
        config.provider_priority.clone(),
    ));
    Arc::clone(&router).attach_queue();

    // Jobs left behind by a previous instance drain immediately.
    if queue.shared_pending_len().await > 0 {
        info!("shared queue has pending jobs, scheduling immediate drain");
        queue.schedule_processing(0);
    }

    let state = AppState {
        router,
        queue,
        breakers,
        tracker,
        router_api_key: config.router_api_key.clone(),
    };
    let app = router_server::build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shut down cleanly");
    Ok(())
}

fn build_adapters(
    config: &RouterConfig,
) -> anyhow::Result<HashMap<Vendor, Arc<dyn ProviderAdapter>>> {
    let mut adapters: HashMap<Vendor, Arc<dyn ProviderAdapter>> = HashMap::new();

    if let Some(key) = &config.openai_api_key {
        let adapter = OpenAiAdapter::new(OpenAiConfig::new(key.expose_secret().as_str()))
            .context("openai adapter")?;
        adapters.insert(Vendor::OpenAi, Arc::new(adapter));
    }
    if let Some(key) = &config.anthropic_api_key {
        let adapter = AnthropicAdapter::new(AnthropicConfig::new(key.expose_secret().as_str()))
            .context("anthropic adapter")?;
        adapters.insert(Vendor::Anthropic, Arc::new(adapter));
    }
    if let Some(key) = &config.google_api_key {
        let adapter = GoogleAdapter::new(GoogleConfig::new(key.expose_secret().as_str()))
            .context("google adapter")?;
        adapters.insert(Vendor::Google, Arc::new(adapter));
    }

    Ok(adapters)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received");
}
