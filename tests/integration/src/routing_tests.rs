//! Fallback and circuit-breaker behavior across mock vendors.

use crate::helpers::{chat_body, spawn_app, AppOptions};
use crate::mock_providers::{MockAnthropic, MockOpenAi};
use router_core::Vendor;
use router_resilience::CircuitState;
use serde_json::Value;

#[tokio::test]
async fn simple_success_carries_router_headers() {
    let openai = MockOpenAi::start().await;
    openai.mock_chat("gpt-4o", "Hi there").await;
    let app = spawn_app(AppOptions {
        openai_url: Some(openai.url()),
        ..AppOptions::default()
    })
    .await;

    let response = app.post_json("/v1/chat/completions", &chat_body("gpt-4o")).await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("x-ai-router-provider").map(|v| v.to_str().expect("ascii")),
        Some("openai")
    );
    assert_eq!(
        response.headers().get("x-ai-router-model").map(|v| v.to_str().expect("ascii")),
        Some("gpt-4o")
    );

    let body: Value = response.json().await.expect("json");
    assert_eq!(body["choices"][0]["message"]["content"], "Hi there");
    assert_eq!(body["model"], "gpt-4o");
}

#[tokio::test]
async fn falls_back_to_anthropic_on_429_and_records_cooldown() {
    let openai = MockOpenAi::start().await;
    openai.mock_rate_limit(30, 1).await;
    let anthropic = MockAnthropic::start().await;
    anthropic.mock_messages("Bonjour").await;

    let app = spawn_app(AppOptions {
        openai_url: Some(openai.url()),
        anthropic_url: Some(anthropic.url()),
        ..AppOptions::default()
    })
    .await;

    let response = app.post_json("/v1/chat/completions", &chat_body("gpt-4o")).await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("x-ai-router-provider").map(|v| v.to_str().expect("ascii")),
        Some("anthropic")
    );
    assert_eq!(
        response.headers().get("x-ai-router-model").map(|v| v.to_str().expect("ascii")),
        Some("claude-opus-4-6")
    );

    // The client still sees the name it asked for.
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["choices"][0]["message"]["content"], "Bonjour");

    // The 429 left (openai, gpt-4o) cooling for roughly retry-after.
    let state = app
        .state
        .tracker
        .state(Vendor::OpenAi, "gpt-4o")
        .expect("tracked state");
    assert!(state.cooling_down);
    let wait = state.cooldown_until.expect("cooldown") - chrono_now();
    assert!(wait.num_seconds() >= 28 && wait.num_seconds() <= 30);
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

#[tokio::test]
async fn circuit_opens_after_consecutive_5xx_and_vendor_is_skipped() {
    let openai = MockOpenAi::start().await;
    openai.mock_server_error(3).await;
    openai.mock_chat("gpt-4o", "should not be reached").await;
    let anthropic = MockAnthropic::start().await;
    anthropic.mock_messages("Covered").await;

    let app = spawn_app(AppOptions {
        openai_url: Some(openai.url()),
        anthropic_url: Some(anthropic.url()),
        cb_failure_threshold: Some(3),
        ..AppOptions::default()
    })
    .await;

    // Three requests, each eating one OpenAI 500 and falling back.
    for _ in 0..3 {
        let response = app.post_json("/v1/chat/completions", &chat_body("gpt-4o")).await;
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get("x-ai-router-provider").map(|v| v.to_str().expect("ascii")),
            Some("anthropic")
        );
    }

    assert_eq!(
        app.state.breakers.get_or_create(Vendor::OpenAi).state(),
        CircuitState::Open
    );

    // With the circuit open, OpenAI is skipped without being dialed: its
    // mock has a 200 armed that must stay unreached.
    let before = openai.server.received_requests().await.expect("requests").len();
    let response = app.post_json("/v1/chat/completions", &chat_body("gpt-4o")).await;
    assert_eq!(response.status(), 200);
    let after = openai.server.received_requests().await.expect("requests").len();
    assert_eq!(before, after);

    // The status endpoint reports the open circuit.
    let status: Value = app.get("/v1/providers/status").await.json().await.expect("json");
    let openai_status = status["providers"]
        .as_array()
        .expect("providers")
        .iter()
        .find(|p| p["vendor"] == "openai")
        .expect("openai entry")
        .clone();
    assert_eq!(openai_status["circuit_state"], "open");
}

#[tokio::test]
async fn client_fatal_errors_do_not_fall_back() {
    let openai = MockOpenAi::start().await;
    openai.mock_bad_request("unsupported parameter").await;
    let anthropic = MockAnthropic::start().await;
    anthropic.mock_messages("never").await;

    let app = spawn_app(AppOptions {
        openai_url: Some(openai.url()),
        anthropic_url: Some(anthropic.url()),
        ..AppOptions::default()
    })
    .await;

    let response = app.post_json("/v1/chat/completions", &chat_body("gpt-4o")).await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["error"]["message"], "unsupported parameter");

    let anthropic_calls = anthropic.server.received_requests().await.expect("requests");
    assert!(anthropic_calls.is_empty());
}

#[tokio::test]
async fn unknown_models_route_best_effort() {
    let openai = MockOpenAi::start().await;
    openai.mock_chat("experimental-model", "routed raw").await;
    let app = spawn_app(AppOptions {
        openai_url: Some(openai.url()),
        ..AppOptions::default()
    })
    .await;

    let response = app
        .post_json("/v1/chat/completions", &chat_body("experimental-model"))
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("x-ai-router-model").map(|v| v.to_str().expect("ascii")),
        Some("experimental-model")
    );
}

#[tokio::test]
async fn anthropic_wire_contract_round_trips_model_name() {
    let openai = MockOpenAi::start().await;
    openai.mock_chat("gpt-4o", "Hello from the other side").await;
    let app = spawn_app(AppOptions {
        openai_url: Some(openai.url()),
        ..AppOptions::default()
    })
    .await;

    // An Anthropic-SDK client asks for claude; the catalog maps it to the
    // only registered vendor (openai), and the reply is Anthropic-shaped
    // with the client's model name intact.
    let response = app
        .post_json(
            "/v1/messages",
            &serde_json::json!({
                "model": "claude-opus-4-6",
                "max_tokens": 128,
                "messages": [{"role": "user", "content": "Hi"}]
            }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["type"], "message");
    assert_eq!(body["model"], "claude-opus-4-6");
    assert_eq!(body["content"][0]["text"], "Hello from the other side");
    assert_eq!(body["stop_reason"], "end_turn");
}
