//! Deferred-retry behavior when every vendor is rate limited.

use crate::helpers::{chat_body, spawn_app, AppOptions};
use crate::mock_providers::MockOpenAi;
use serde_json::Value;
use std::time::{Duration, Instant};

#[tokio::test]
async fn short_exhaustion_blocks_inline_and_delivers() {
    let openai = MockOpenAi::start().await;
    openai.mock_rate_limit(1, 1).await;
    openai.mock_chat("gpt-4o", "worth the wait").await;

    let app = spawn_app(AppOptions {
        openai_url: Some(openai.url()),
        ..AppOptions::default()
    })
    .await;

    let started = Instant::now();
    let response = app.post_json("/v1/chat/completions", &chat_body("gpt-4o")).await;
    let elapsed = started.elapsed();

    // The sync queue path held the caller through the ~1s cooldown.
    assert_eq!(response.status(), 200);
    assert!(elapsed >= Duration::from_millis(800), "elapsed: {elapsed:?}");
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["choices"][0]["message"]["content"], "worth the wait");
}

#[tokio::test]
async fn long_exhaustion_returns_a_pollable_job() {
    let openai = MockOpenAi::start().await;
    openai.mock_rate_limit(1, 1).await;
    openai.mock_chat("gpt-4o", "eventually").await;

    let app = spawn_app(AppOptions {
        openai_url: Some(openai.url()),
        // A ~1s wait estimate lands above this split, forcing the async path.
        queue_async_threshold: Some(Duration::from_millis(200)),
        ..AppOptions::default()
    })
    .await;

    let response = app.post_json("/v1/chat/completions", &chat_body("gpt-4o")).await;
    assert_eq!(response.status(), 202);
    let envelope: Value = response.json().await.expect("json");
    assert_eq!(envelope["object"], "queue.job");
    assert_eq!(envelope["status"], "pending");
    let job_id = envelope["id"].as_str().expect("job id").to_string();
    assert_eq!(
        envelope["poll_url"],
        format!("/v1/queue/{job_id}")
    );
    assert!(envelope["estimated_wait_ms"].as_u64().expect("wait") > 200);

    // Still pending while the cooldown runs.
    let response = app.get(&format!("/v1/queue/{job_id}")).await;
    assert_eq!(response.status(), 202);

    // After the cooldown the drain retried and stored the result.
    tokio::time::sleep(Duration::from_millis(1600)).await;
    let response = app.get(&format!("/v1/queue/{job_id}")).await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("x-ai-router-provider").map(|v| v.to_str().expect("ascii")),
        Some("openai")
    );
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["choices"][0]["message"]["content"], "eventually");
}

#[tokio::test]
async fn expired_jobs_poll_as_408() {
    let openai = MockOpenAi::start().await;
    // The vendor never recovers within the job deadline.
    openai.mock_rate_limit(5, 100).await;

    let app = spawn_app(AppOptions {
        openai_url: Some(openai.url()),
        queue_async_threshold: Some(Duration::from_millis(200)),
        queue_timeout: Some(Duration::from_millis(300)),
        ..AppOptions::default()
    })
    .await;

    let response = app.post_json("/v1/chat/completions", &chat_body("gpt-4o")).await;
    assert_eq!(response.status(), 202);
    let envelope: Value = response.json().await.expect("json");
    let job_id = envelope["id"].as_str().expect("job id").to_string();

    tokio::time::sleep(Duration::from_millis(400)).await;
    let response = app.get(&format!("/v1/queue/{job_id}")).await;
    assert_eq!(response.status(), 408);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["error"]["code"], "queue_timeout");
}
