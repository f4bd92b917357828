//! Wiremock-based mock vendors.

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A canned OpenAI chat completion body.
#[must_use]
pub fn openai_chat_response(model: &str, content: &str) -> Value {
    json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "created": 1_722_000_000,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 5, "completion_tokens": 7, "total_tokens": 12}
    })
}

/// Mock OpenAI API server.
pub struct MockOpenAi {
    /// The underlying wiremock server.
    pub server: MockServer,
}

impl MockOpenAi {
    /// Start the mock.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL to hand to the adapter config.
    #[must_use]
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Always answer chat completions with a 200.
    pub async fn mock_chat(&self, model: &str, content: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(openai_chat_response(model, content)),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer chat completions with a 200 after sitting on the request.
    pub async fn mock_chat_delayed(
        &self,
        model: &str,
        content: &str,
        delay: std::time::Duration,
    ) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(openai_chat_response(model, content))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer the next `n` chat calls with a 429 carrying `retry-after`.
    pub async fn mock_rate_limit(&self, retry_after_secs: u64, n: u64) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(429)
                    .append_header("retry-after", retry_after_secs.to_string())
                    .set_body_json(json!({
                        "error": {"message": "Rate limit exceeded", "type": "rate_limit_error"}
                    })),
            )
            .up_to_n_times(n)
            .mount(&self.server)
            .await;
    }

    /// Answer the next `n` chat calls with a 500.
    pub async fn mock_server_error(&self, n: u64) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": {"message": "Internal server error", "type": "server_error"}
            })))
            .up_to_n_times(n)
            .mount(&self.server)
            .await;
    }

    /// Answer chat calls with a client-side 400.
    pub async fn mock_bad_request(&self, message: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": message, "type": "invalid_request_error"}
            })))
            .mount(&self.server)
            .await;
    }
}

/// Mock Anthropic API server.
pub struct MockAnthropic {
    /// The underlying wiremock server.
    pub server: MockServer,
}

impl MockAnthropic {
    /// Start the mock.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL to hand to the adapter config.
    #[must_use]
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Always answer messages with a 200.
    pub async fn mock_messages(&self, content: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_mock",
                "type": "message",
                "role": "assistant",
                "content": [{"type": "text", "text": content}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 5, "output_tokens": 7}
            })))
            .mount(&self.server)
            .await;
    }

    /// Stream canned Anthropic events over SSE.
    pub async fn mock_stream(&self, deltas: &[&str]) {
        let mut body = String::new();
        body.push_str("event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_mock\"}}\n\n");
        for delta in deltas {
            body.push_str(&format!(
                "event: content_block_delta\ndata: {}\n\n",
                json!({
                    "type": "content_block_delta",
                    "index": 0,
                    "delta": {"type": "text_delta", "text": delta}
                })
            ));
        }
        body.push_str("event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"}}\n\n");
        body.push_str("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n");

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer the next `n` messages calls with a 429.
    pub async fn mock_rate_limit(&self, retry_after_secs: u64, n: u64) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(429)
                    .append_header("retry-after", retry_after_secs.to_string())
                    .set_body_json(json!({
                        "type": "error",
                        "error": {"type": "rate_limit_error", "message": "Rate limited"}
                    })),
            )
            .up_to_n_times(n)
            .mount(&self.server)
            .await;
    }
}

/// Mock Google Gemini API server.
pub struct MockGoogle {
    /// The underlying wiremock server.
    pub server: MockServer,
}

impl MockGoogle {
    /// Start the mock.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL to hand to the adapter config.
    #[must_use]
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Always answer generateContent with a 200.
    pub async fn mock_generate(&self, model: &str, content: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/models/{model}:generateContent")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": content}]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {
                    "promptTokenCount": 5,
                    "candidatesTokenCount": 7,
                    "totalTokenCount": 12
                }
            })))
            .mount(&self.server)
            .await;
    }
}
