//! Normalized response types (OpenAI wire shape).

use crate::request::MessageRole;
use serde::{Deserialize, Serialize};

/// Chat completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Response identifier.
    pub id: String,

    /// Always "chat.completion".
    #[serde(default = "default_chat_object")]
    pub object: String,

    /// Unix timestamp of creation.
    #[serde(default)]
    pub created: i64,

    /// Model name; the router always fills this with the client's
    /// requested name, never the vendor-side name actually used.
    pub model: String,

    /// Completion choices.
    pub choices: Vec<Choice>,

    /// Token usage.
    #[serde(default)]
    pub usage: Usage,
}

fn default_chat_object() -> String {
    "chat.completion".to_string()
}

/// One completion choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Choice index.
    pub index: u32,

    /// The generated message.
    pub message: ResponseMessage,

    /// Why generation stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// The assistant message inside a choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Always assistant for completions.
    pub role: MessageRole,

    /// Generated text.
    #[serde(default)]
    pub content: Option<String>,
}

impl ResponseMessage {
    /// Build an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(content.into()),
        }
    }
}

/// Normalized finish reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end or stop sequence hit.
    Stop,
    /// Token limit reached.
    Length,
    /// Vendor safety filter triggered.
    ContentFilter,
    /// The model invoked a tool.
    ToolCalls,
}

impl FinishReason {
    /// Wire string for this reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ContentFilter => "content_filter",
            Self::ToolCalls => "tool_calls",
        }
    }
}

/// Token usage accounting.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt.
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Tokens generated.
    #[serde(default)]
    pub completion_tokens: u32,
    /// Sum of the two.
    #[serde(default)]
    pub total_tokens: u32,
}

/// Image generation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesResponse {
    /// Unix timestamp of creation.
    pub created: i64,
    /// Generated images.
    pub data: Vec<ImageDatum>,
}

/// One generated image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageDatum {
    /// Base64-encoded image bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,

    /// Hosted image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Prompt after any vendor-side revision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}

/// Embedding response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// Always "list".
    #[serde(default = "default_list_object")]
    pub object: String,
    /// Embedding vectors.
    pub data: Vec<EmbeddingDatum>,
    /// Model name (requested name, see [`ChatResponse::model`]).
    pub model: String,
    /// Token usage.
    #[serde(default)]
    pub usage: Usage,
}

fn default_list_object() -> String {
    "list".to_string()
}

/// One embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingDatum {
    /// Always "embedding".
    #[serde(default = "default_embedding_object")]
    pub object: String,
    /// Position in the input batch.
    pub index: u32,
    /// The vector.
    pub embedding: Vec<f32>,
}

fn default_embedding_object() -> String {
    "embedding".to_string()
}
