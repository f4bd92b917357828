//! Stream rewriting end to end.

use crate::helpers::{spawn_app, AppOptions, ROUTER_KEY};
use crate::mock_providers::MockAnthropic;
use router_core::ChatChunk;
use serde_json::json;

/// Collect the `data:` payloads of an SSE body.
fn data_payloads(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn anthropic_stream_is_rewritten_to_openai_chunks() {
    let anthropic = MockAnthropic::start().await;
    anthropic.mock_stream(&["Hello", " World"]).await;

    let app = spawn_app(AppOptions {
        anthropic_url: Some(anthropic.url()),
        ..AppOptions::default()
    })
    .await;

    let response = app
        .client
        .post(format!("{}/v1/chat/completions", app.base_url))
        .header("authorization", format!("Bearer {ROUTER_KEY}"))
        .json(&json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "Hi"}],
            "stream": true
        }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .map(|v| v.to_str().expect("ascii")),
        Some("text/event-stream")
    );
    assert_eq!(
        response
            .headers()
            .get("x-accel-buffering")
            .map(|v| v.to_str().expect("ascii")),
        Some("no")
    );

    let body = response.text().await.expect("body");
    let payloads = data_payloads(&body);

    // Two content chunks, one finish chunk, then the DONE marker.
    assert_eq!(payloads.last().map(String::as_str), Some("[DONE]"));
    let chunks: Vec<ChatChunk> = payloads
        .iter()
        .filter(|p| p.as_str() != "[DONE]")
        .map(|p| serde_json::from_str(p).expect("chunk"))
        .collect();

    let texts: Vec<&str> = chunks
        .iter()
        .filter_map(|c| c.choices[0].delta.content.as_deref())
        .collect();
    assert_eq!(texts, vec!["Hello", " World"]);

    // Chunks echo the client's requested model name.
    assert!(chunks.iter().all(|c| c.model == "gpt-4o"));
    assert!(chunks
        .iter()
        .any(|c| c.choices[0].finish_reason.is_some()));
}

#[tokio::test]
async fn messages_entry_synthesizes_anthropic_events() {
    let anthropic = MockAnthropic::start().await;
    anthropic.mock_stream(&["Hi"]).await;

    let app = spawn_app(AppOptions {
        anthropic_url: Some(anthropic.url()),
        ..AppOptions::default()
    })
    .await;

    let response = app
        .client
        .post(format!("{}/v1/messages", app.base_url))
        .header("authorization", format!("Bearer {ROUTER_KEY}"))
        .json(&json!({
            "model": "claude-opus-4-6",
            "max_tokens": 64,
            "messages": [{"role": "user", "content": "Hi"}],
            "stream": true
        }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
    let body = response.text().await.expect("body");

    let events: Vec<&str> = body
        .lines()
        .filter_map(|line| line.strip_prefix("event: "))
        .collect();
    assert_eq!(
        events,
        vec![
            "message_start",
            "ping",
            "content_block_start",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_stop",
        ]
    );
    assert!(body.contains("\"text\":\"Hi\""));
    assert!(body.contains("\"stop_reason\":\"end_turn\""));
}
