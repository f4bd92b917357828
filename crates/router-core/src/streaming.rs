//! Streaming chunk types (OpenAI wire shape).

use crate::request::MessageRole;
use crate::response::FinishReason;
use serde::{Deserialize, Serialize};

/// One streamed completion chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunk {
    /// Chunk identifier (stable across a stream).
    pub id: String,

    /// Always "chat.completion.chunk".
    #[serde(default = "default_chunk_object")]
    pub object: String,

    /// Unix timestamp of creation.
    #[serde(default)]
    pub created: i64,

    /// Model name (the client's requested name).
    pub model: String,

    /// Chunk choices.
    pub choices: Vec<ChunkChoice>,
}

fn default_chunk_object() -> String {
    "chat.completion.chunk".to_string()
}

impl ChatChunk {
    /// Chunk carrying a content delta.
    #[must_use]
    pub fn content(id: impl Into<String>, created: i64, model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: default_chunk_object(),
            created,
            model: model.into(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: Some(MessageRole::Assistant),
                    content: Some(text.into()),
                },
                finish_reason: None,
            }],
        }
    }

    /// Terminal chunk carrying only a finish reason.
    #[must_use]
    pub fn finish(id: impl Into<String>, created: i64, model: impl Into<String>, reason: FinishReason) -> Self {
        Self {
            id: id.into(),
            object: default_chunk_object(),
            created,
            model: model.into(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: None,
                    content: None,
                },
                finish_reason: Some(reason),
            }],
        }
    }
}

/// One choice within a chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Choice index.
    pub index: u32,

    /// Incremental delta.
    pub delta: ChunkDelta,

    /// Set on the final chunk of a choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// Incremental message delta.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    /// Role, present on the first chunk only by convention.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,

    /// Appended content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}
