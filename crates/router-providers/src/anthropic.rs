//! Anthropic adapter.
//!
//! Translates the OpenAI-shaped intermediate to the Anthropic messages API
//! and back. System messages fold into the top-level `system` field,
//! `stop` becomes `stop_sequences`, and the fields Anthropic has no
//! equivalent for (`frequency_penalty`, `presence_penalty`, `logprobs`,
//! `top_logprobs`) are dropped. Streams are rewritten event-by-event into
//! OpenAI chunks.

use crate::adapter::{
    http_client, lowercase_headers, mint_id, send_checked, unix_now, with_cancel, AdapterReply,
    AdapterRequest, ProviderAdapter, VENDOR_TIMEOUT,
};
use crate::sse;
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use router_core::{
    Capability, ChatChunk, ChatRequest, ChatResponse, Choice, FinishReason, MessageRole,
    ResponseMessage, RouterError, RouterResult, Usage, Vendor,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Required when the client did not set `max_tokens`; the messages API has
/// no default of its own.
const DEFAULT_MAX_TOKENS: u32 = 4096;

const API_VERSION: &str = "2023-06-01";

/// Anthropic adapter configuration.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key.
    pub api_key: SecretString,
    /// Base URL without a path.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl AnthropicConfig {
    /// Configuration against the public API.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            base_url: "https://api.anthropic.com".to_string(),
            timeout: VENDOR_TIMEOUT,
        }
    }

    /// Override the base URL (tests point this at a mock server).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// The Anthropic adapter.
pub struct AnthropicAdapter {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicAdapter {
    /// Create the adapter.
    ///
    /// # Errors
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new(config: AnthropicConfig) -> RouterResult<Self> {
        let client = http_client(config.timeout)?;
        Ok(Self { config, client })
    }

    fn transform_request(request: &ChatRequest, vendor_model: &str) -> AnthropicRequest {
        let system = request.system_text();
        let messages = request
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| AnthropicMessage {
                role: if m.role == MessageRole::Assistant {
                    "assistant"
                } else {
                    "user"
                },
                content: m.content.flattened_text(),
            })
            .collect();

        AnthropicRequest {
            model: vendor_model.to_string(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages,
            system: (!system.is_empty()).then_some(system),
            temperature: request.temperature,
            top_p: request.top_p,
            stop_sequences: request.stop.as_ref().map(|s| s.to_vec()),
            stream: request.stream.then_some(true),
        }
    }

    fn transform_response(response: AnthropicResponse, requested_model: &str) -> ChatResponse {
        let text = response
            .content
            .first()
            .and_then(|block| block.text.clone())
            .unwrap_or_default();
        let usage = response.usage.unwrap_or_default();

        ChatResponse {
            id: response.id.unwrap_or_else(|| mint_id("chatcmpl")),
            object: "chat.completion".to_string(),
            created: unix_now(),
            model: requested_model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage::assistant(text),
                finish_reason: Some(map_stop_reason(response.stop_reason.as_deref())),
            }],
            usage: Usage {
                prompt_tokens: usage.input_tokens,
                completion_tokens: usage.output_tokens,
                total_tokens: usage.input_tokens + usage.output_tokens,
            },
        }
    }
}

fn map_stop_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("max_tokens") => FinishReason::Length,
        // end_turn, stop_sequence, and anything unrecognized all read as a
        // normal stop on the OpenAI side.
        _ => FinishReason::Stop,
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Anthropic
    }

    async fn call(
        &self,
        request: AdapterRequest<'_>,
        cancel: &CancellationToken,
    ) -> RouterResult<AdapterReply> {
        if request.capability != Capability::Chat {
            return Err(RouterError::validation(
                format!("anthropic cannot serve {} requests", request.capability),
                "unsupported_capability",
            ));
        }

        let chat: ChatRequest = serde_json::from_value(request.body.clone())
            .map_err(|e| RouterError::validation(e.to_string(), "invalid_request"))?;
        let streaming = chat.stream;
        let native = Self::transform_request(&chat, request.vendor_model);

        let url = format!("{}/v1/messages", self.config.base_url);
        debug!(model = %request.vendor_model, url = %url, streaming, "dispatching to anthropic");

        let http = self
            .client
            .post(&url)
            .header("x-api-key", self.config.api_key.expose_secret().as_str())
            .header("anthropic-version", API_VERSION)
            .json(&native);

        let response = with_cancel(cancel, send_checked(Vendor::Anthropic, http)).await?;
        let status = response.status().as_u16();
        let headers = lowercase_headers(response.headers());

        if streaming {
            let frames = rewrite_stream(
                sse::data_events(response, Vendor::Anthropic, cancel.clone()),
                request.requested_model.to_string(),
            );
            return Ok(AdapterReply::stream(status, headers, frames));
        }

        let native: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| RouterError::transport(Vendor::Anthropic, format!("body: {e}")))?;
        let translated = Self::transform_response(native, request.requested_model);
        let json = serde_json::to_value(translated)
            .map_err(|e| RouterError::internal(format!("response serialization: {e}")))?;

        Ok(AdapterReply::json(status, headers, json))
    }
}

/// Rewrite the Anthropic event stream into OpenAI chunks.
///
/// `content_block_delta` text deltas become content chunks, the
/// `message_delta` stop reason becomes a finish chunk, `message_stop`
/// becomes the `[DONE]` marker. Every other event is swallowed.
fn rewrite_stream(
    events: impl futures::Stream<Item = RouterResult<String>> + Send + 'static,
    requested_model: String,
) -> crate::adapter::SseFrames {
    let stream_id = mint_id("chatcmpl");
    let created = unix_now();

    sse::boxed(try_stream! {
        let mut events = std::pin::pin!(events);
        while let Some(event) = events.next().await {
            let payload = event?;
            let Ok(event) = serde_json::from_str::<StreamEvent>(&payload) else {
                continue;
            };

            match event.event_type.as_str() {
                "content_block_delta" => {
                    let delta = event.delta.unwrap_or_default();
                    if delta.delta_type.as_deref() == Some("text_delta") {
                        if let Some(text) = delta.text {
                            let chunk =
                                ChatChunk::content(stream_id.as_str(), created, requested_model.as_str(), text);
                            yield sse::frame(&serde_json::to_string(&chunk).map_err(|e| {
                                RouterError::internal(format!("chunk serialization: {e}"))
                            })?);
                        }
                    }
                }
                "message_delta" => {
                    if let Some(reason) = event.delta.unwrap_or_default().stop_reason {
                        let chunk = ChatChunk::finish(
                            stream_id.as_str(),
                            created,
                            requested_model.as_str(),
                            map_stop_reason(Some(&reason)),
                        );
                        yield sse::frame(&serde_json::to_string(&chunk).map_err(|e| {
                            RouterError::internal(format!("chunk serialization: {e}"))
                        })?);
                    }
                }
                "message_stop" => {
                    yield sse::done_frame();
                    break;
                }
                _ => {}
            }
        }
    })
}

// Anthropic wire types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    content: Vec<AnthropicContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(rename = "type", default)]
    delta_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}
