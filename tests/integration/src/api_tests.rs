//! Surface-level API behavior: auth, validation, health, status.

use crate::helpers::{chat_body, spawn_app, AppOptions, ROUTER_KEY};
use crate::mock_providers::MockOpenAi;
use serde_json::Value;

async fn app_with_openai() -> (crate::helpers::TestApp, MockOpenAi) {
    let openai = MockOpenAi::start().await;
    openai.mock_chat("gpt-4o", "Hello!").await;
    let app = spawn_app(AppOptions {
        openai_url: Some(openai.url()),
        ..AppOptions::default()
    })
    .await;
    (app, openai)
}

#[tokio::test]
async fn health_is_open_and_shaped() {
    let (app, _openai) = app_with_openai().await;

    let response = app.get("/health").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "llm-router");
    assert!(body["timestamp"].as_str().is_some());
    assert!(body["version"].as_str().is_some());
}

#[tokio::test]
async fn posts_require_the_router_token() {
    let (app, _openai) = app_with_openai().await;

    let response = app
        .client
        .post(format!("{}/v1/chat/completions", app.base_url))
        .json(&chat_body("gpt-4o"))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 401);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["error"]["type"], "authentication_error");

    // x-api-key is accepted equally.
    let response = app
        .client
        .post(format!("{}/v1/chat/completions", app.base_url))
        .header("x-api-key", ROUTER_KEY)
        .json(&chat_body("gpt-4o"))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn chat_validation_errors_are_structured_400s() {
    let (app, _openai) = app_with_openai().await;

    let response = app
        .post_json(
            "/v1/chat/completions",
            &serde_json::json!({"messages": [{"role": "user", "content": "Hi"}]}),
        )
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(body["error"]["code"], "missing_model");

    let response = app
        .post_json(
            "/v1/chat/completions",
            &serde_json::json!({"model": "gpt-4o", "messages": []}),
        )
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["error"]["code"], "missing_messages");
}

#[tokio::test]
async fn image_and_embedding_validation() {
    let (app, _openai) = app_with_openai().await;

    let response = app
        .post_json("/v1/images/generations", &serde_json::json!({"n": 1}))
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["error"]["code"], "missing_prompt");

    let response = app
        .post_json("/v1/embeddings", &serde_json::json!({"model": "text-embedding-3-small"}))
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["error"]["code"], "missing_input");
}

#[tokio::test]
async fn anthropic_path_uses_anthropic_error_shape() {
    let (app, _openai) = app_with_openai().await;

    let response = app
        .post_json("/v1/messages", &serde_json::json!({"model": "", "messages": []}))
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["type"], "error");
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert!(body["error"]["message"].as_str().is_some());
}

#[tokio::test]
async fn unknown_job_polls_404() {
    let (app, _openai) = app_with_openai().await;

    let response = app.get("/v1/queue/no-such-job").await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn providers_status_reports_registered_vendors() {
    let (app, _openai) = app_with_openai().await;

    let response = app.get("/v1/providers/status").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("json");

    let providers = body["providers"].as_array().expect("providers");
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0]["vendor"], "openai");
    assert_eq!(providers[0]["circuit_state"], "closed");
    assert_eq!(body["queue_size"], 0);
}

#[tokio::test]
async fn models_lists_canonical_names() {
    let (app, _openai) = app_with_openai().await;

    let response = app.get("/v1/models").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("json");
    let ids: Vec<&str> = body["data"]
        .as_array()
        .expect("data")
        .iter()
        .filter_map(|m| m["id"].as_str())
        .collect();
    assert!(ids.contains(&"gpt-4o"));
    assert!(ids.contains(&"dall-e-3"));
    assert!(ids.contains(&"text-embedding-3-small"));
}

#[tokio::test]
async fn request_id_is_echoed_or_replaced() {
    let (app, _openai) = app_with_openai().await;

    let id = "0a0f7d6c-3f7d-4a4e-9b1a-2a7cf0e6d111";
    let response = app
        .client
        .post(format!("{}/v1/chat/completions", app.base_url))
        .header("authorization", format!("Bearer {ROUTER_KEY}"))
        .header("x-request-id", id)
        .json(&chat_body("gpt-4o"))
        .send()
        .await
        .expect("request");
    assert_eq!(
        response.headers().get("x-request-id").map(|v| v.to_str().expect("ascii")),
        Some(id)
    );

    let response = app
        .client
        .post(format!("{}/v1/chat/completions", app.base_url))
        .header("authorization", format!("Bearer {ROUTER_KEY}"))
        .header("x-request-id", "definitely not a uuid")
        .json(&chat_body("gpt-4o"))
        .send()
        .await
        .expect("request");
    let echoed = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .expect("header");
    assert_ne!(echoed, "definitely not a uuid");
}
