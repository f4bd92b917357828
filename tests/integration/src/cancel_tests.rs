//! Abort behavior: client disconnects and fired abort signals.

use crate::helpers::{chat_body, spawn_app, AppOptions, ROUTER_KEY};
use crate::mock_providers::MockOpenAi;
use router_core::{Capability, RouterError, Vendor};
use router_resilience::CircuitState;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn client_disconnect_aborts_the_inflight_vendor_call() {
    let openai = MockOpenAi::start().await;
    openai
        .mock_chat_delayed("gpt-4o", "too late", Duration::from_secs(3))
        .await;
    let app = spawn_app(AppOptions {
        openai_url: Some(openai.url()),
        ..AppOptions::default()
    })
    .await;

    // A client that gives up after 150 ms, dropping the connection while
    // the vendor is still sitting on the request.
    let impatient = reqwest::Client::builder()
        .timeout(Duration::from_millis(150))
        .build()
        .expect("client");
    let result = impatient
        .post(format!("{}/v1/chat/completions", app.base_url))
        .header("authorization", format!("Bearer {ROUTER_KEY}"))
        .json(&chat_body("gpt-4o"))
        .send()
        .await;
    assert!(result.is_err(), "client should have timed out");

    // The vendor did receive the call before the disconnect.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        openai.server.received_requests().await.expect("requests").len(),
        1
    );

    // Well past the vendor's delay: a call that ran to completion would
    // have recorded tracker state and a breaker success. An aborted one
    // leaves both untouched.
    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert!(app.state.tracker.state(Vendor::OpenAi, "gpt-4o").is_none());
    let breaker = app.state.breakers.get_or_create(Vendor::OpenAi).snapshot();
    assert_eq!(breaker.state, CircuitState::Closed);
    assert_eq!(breaker.failure_count, 0);
}

#[tokio::test]
async fn abort_signal_cancels_the_vendor_call_promptly() {
    let openai = MockOpenAi::start().await;
    openai
        .mock_chat_delayed("gpt-4o", "too late", Duration::from_secs(5))
        .await;
    let app = spawn_app(AppOptions {
        openai_url: Some(openai.url()),
        ..AppOptions::default()
    })
    .await;

    let cancel = CancellationToken::new();
    let fire = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        fire.cancel();
    });

    let started = Instant::now();
    let err = app
        .state
        .router
        .execute("gpt-4o", Capability::Chat, &cancel, chat_body("gpt-4o"))
        .await
        .expect_err("aborted call");

    assert!(matches!(err, RouterError::Cancelled));
    // The abort cut the call short; the vendor would have held it for 5 s.
    assert!(started.elapsed() < Duration::from_secs(1));

    // Cancellation is not a vendor failure.
    assert_eq!(
        app.state.breakers.get_or_create(Vendor::OpenAi).state(),
        CircuitState::Closed
    );
}
