//! The native Anthropic wire contract.
//!
//! Anthropic-SDK clients hit `/v1/messages`; the translators here wrap the
//! same pipeline the OpenAI-shaped entries use. Inbound requests become
//! the internal intermediate, unary results become Anthropic message
//! documents, and streamed results are synthesized into the Anthropic
//! event sequence.

use futures_util::StreamExt;
use router_core::ChatChunk;
use router_providers::sse;
use router_providers::SseFrames;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

/// Inbound request on the Anthropic contract.
#[derive(Debug, Deserialize)]
pub struct MessagesRequest {
    /// Model name.
    pub model: String,
    /// Conversation turns.
    pub messages: Vec<InboundMessage>,
    /// Top-level system prompt, a string or content blocks.
    #[serde(default)]
    pub system: Option<SystemField>,
    /// Required by the Anthropic contract; propagated as-is.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter.
    #[serde(default)]
    pub top_p: Option<f32>,
    /// Stop sequences.
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,
    /// Streaming flag.
    #[serde(default)]
    pub stream: bool,
}

/// One inbound turn; content is a string or text blocks.
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    /// "user" or "assistant".
    pub role: String,
    /// Message content.
    pub content: Value,
}

/// The `system` field accepts a string or a block list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SystemField {
    /// Plain string.
    Text(String),
    /// Content blocks.
    Blocks(Vec<Value>),
}

impl SystemField {
    fn flattened(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Blocks(blocks) => flatten_blocks(blocks),
        }
    }
}

/// Concatenate the text of content blocks; a bare string passes through.
fn flatten_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => flatten_blocks(blocks),
        _ => String::new(),
    }
}

fn flatten_blocks(blocks: &[Value]) -> String {
    blocks
        .iter()
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("")
}

impl MessagesRequest {
    /// Translate into the internal OpenAI-shaped intermediate.
    #[must_use]
    pub fn to_internal(&self) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &self.system {
            messages.push(json!({"role": "system", "content": system.flattened()}));
        }
        for message in &self.messages {
            let role = if message.role == "assistant" {
                "assistant"
            } else {
                "user"
            };
            messages.push(json!({
                "role": role,
                "content": flatten_content(&message.content)
            }));
        }

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": self.stream,
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = self.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(stop) = &self.stop_sequences {
            body["stop"] = json!(stop);
        }
        body
    }
}

/// Finish-reason mapping, internal (OpenAI) to Anthropic.
fn map_stop_reason(finish_reason: Option<&str>) -> &'static str {
    match finish_reason {
        Some("length") => "max_tokens",
        Some("content_filter") => "stop_sequence",
        // stop and anything unrecognized read as a normal end of turn.
        _ => "end_turn",
    }
}

fn mint_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

/// Translate an internal unary chat response into an Anthropic message.
#[must_use]
pub fn to_messages_response(internal: &Value, requested_model: &str) -> Value {
    let text = internal
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let finish_reason = internal
        .pointer("/choices/0/finish_reason")
        .and_then(Value::as_str);
    let id = internal
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map_or_else(mint_message_id, str::to_string);

    json!({
        "id": id,
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": text}],
        "model": requested_model,
        "stop_reason": map_stop_reason(finish_reason),
        "stop_sequence": Value::Null,
        "usage": {
            "input_tokens": internal.pointer("/usage/prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
            "output_tokens": internal.pointer("/usage/completion_tokens").and_then(Value::as_u64).unwrap_or(0),
        }
    })
}

/// Synthesize the Anthropic event stream from the internal chunk stream.
///
/// Event order: `message_start`, `ping`, then `content_block_start` once
/// before the first delta, `content_block_delta` per content chunk, and on
/// finish `content_block_stop`, `message_delta` (with the mapped stop
/// reason and an output-token estimate), `message_stop`.
#[must_use]
pub fn to_messages_stream(frames: SseFrames, requested_model: String) -> SseFrames {
    let message_id = mint_message_id();

    sse::boxed(async_stream::try_stream! {
        let mut frames = std::pin::pin!(frames);

        yield sse::named_frame("message_start", &json!({
            "type": "message_start",
            "message": {
                "id": message_id,
                "type": "message",
                "role": "assistant",
                "content": [],
                "model": requested_model,
                "stop_reason": Value::Null,
                "usage": {"input_tokens": 0, "output_tokens": 0},
            }
        }))?;
        yield sse::named_frame("ping", &json!({"type": "ping"}))?;

        let mut block_started = false;
        let mut stop_reason: Option<String> = None;
        let mut emitted_chars = 0usize;

        while let Some(frame) = frames.next().await {
            let frame = frame?;
            let Some(payload) = extract_data_payload(&frame) else {
                continue;
            };
            if payload == "[DONE]" {
                break;
            }
            let Ok(chunk) = serde_json::from_str::<ChatChunk>(&payload) else {
                debug!("dropping unparseable chunk from internal stream");
                continue;
            };
            let Some(choice) = chunk.choices.first() else {
                continue;
            };

            if let Some(reason) = choice.finish_reason {
                stop_reason = Some(reason.as_str().to_string());
            }
            if let Some(text) = &choice.delta.content {
                if !block_started {
                    block_started = true;
                    yield sse::named_frame("content_block_start", &json!({
                        "type": "content_block_start",
                        "index": 0,
                        "content_block": {"type": "text", "text": ""},
                    }))?;
                }
                emitted_chars += text.len();
                yield sse::named_frame("content_block_delta", &json!({
                    "type": "content_block_delta",
                    "index": 0,
                    "delta": {"type": "text_delta", "text": text},
                }))?;
            }
        }

        if block_started {
            yield sse::named_frame("content_block_stop", &json!({
                "type": "content_block_stop",
                "index": 0,
            }))?;
        }
        yield sse::named_frame("message_delta", &json!({
            "type": "message_delta",
            "delta": {
                "stop_reason": map_stop_reason(stop_reason.as_deref()),
                "stop_sequence": Value::Null,
            },
            // Internal streams carry no usage; estimate roughly four
            // characters per token, as the unary path would report.
            "usage": {"output_tokens": (emitted_chars / 4).max(1)},
        }))?;
        yield sse::named_frame("message_stop", &json!({"type": "message_stop"}))?;
    })
}

/// Pull the payload out of a framed `data:` line.
fn extract_data_payload(frame: &str) -> Option<String> {
    frame
        .lines()
        .find_map(|line| line.strip_prefix("data:"))
        .map(|data| data.trim().to_string())
}
