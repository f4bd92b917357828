//! Normalized request types.
//!
//! The router's internal intermediate has the shape of the OpenAI chat
//! request; every adapter accepts it and translates outward from it.

use serde::{Deserialize, Serialize};

/// Normalized chat completion request (OpenAI wire shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model name as requested by the client.
    pub model: String,

    /// Ordered conversation messages.
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Nucleus sampling parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Number of completions to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,

    /// Stop sequence(s), a single string or a list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopSequences>,

    /// Frequency penalty (-2.0 to 2.0). Not supported by every vendor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    /// Presence penalty (-2.0 to 2.0). Not supported by every vendor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,

    /// Request log probabilities. Not supported by every vendor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<bool>,

    /// Number of top log probabilities per token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_logprobs: Option<u32>,

    /// Response format configuration (`{"type": "json_object"}`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,

    /// User identifier for abuse tracking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Enable streaming response.
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    /// Minimal validation performed before dispatch: the request must name a
    /// model and carry at least one message.
    ///
    /// # Errors
    /// Returns a validation error naming the missing field.
    pub fn validate(&self) -> Result<(), crate::error::RouterError> {
        if self.model.trim().is_empty() {
            return Err(crate::error::RouterError::validation(
                "model is required",
                "missing_model",
            ));
        }
        if self.messages.is_empty() {
            return Err(crate::error::RouterError::validation(
                "messages must be a non-empty array",
                "missing_messages",
            ));
        }
        Ok(())
    }

    /// Concatenated text of all system messages, separated by blank lines.
    /// Empty string when the conversation has no system prompt.
    #[must_use]
    pub fn system_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.flattened_text())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// A single conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author role.
    pub role: MessageRole,

    /// Message content, plain text or multimodal parts.
    pub content: MessageContent,

    /// Optional author name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    /// Create a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: MessageContent::Text(content.into()),
            name: None,
        }
    }

    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Text(content.into()),
            name: None,
        }
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: MessageContent::Text(content.into()),
            name: None,
        }
    }
}

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt.
    System,
    /// End-user turn.
    User,
    /// Model turn.
    Assistant,
    /// Legacy function-call result.
    Function,
    /// Tool-call result.
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Function => write!(f, "function"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// Message content (text or multimodal parts).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content.
    Text(String),
    /// Multimodal content parts.
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Flatten the content to its concatenated text, ignoring images.
    #[must_use]
    pub fn flattened_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Content part for multimodal messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content part.
    Text {
        /// The text content.
        text: String,
    },
    /// Image content part.
    ImageUrl {
        /// Image URL details.
        image_url: ImageUrl,
    },
}

/// Image URL wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    /// URL or data URL of the image.
    pub url: String,
}

/// Stop sequences: the OpenAI contract accepts a string or a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopSequences {
    /// Single stop sequence.
    One(String),
    /// Multiple stop sequences.
    Many(Vec<String>),
}

impl StopSequences {
    /// Always-a-list view, the shape Anthropic and Google want.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s.clone()],
            Self::Many(v) => v.clone(),
        }
    }
}

/// Response format configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFormat {
    /// Format type: "text" or "json_object".
    #[serde(rename = "type")]
    pub format_type: String,
}

/// Image generation request (OpenAI wire shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRequest {
    /// Prompt text.
    pub prompt: String,

    /// Model name as requested by the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Number of images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,

    /// Image dimensions, e.g. "1024x1024".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// "url" or "b64_json".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
}

/// Embedding request (OpenAI wire shape). `input` stays opaque: a string or
/// an array of strings both pass through to the vendor untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Model name as requested by the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Input text(s).
    pub input: serde_json::Value,

    /// Encoding format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<String>,
}
