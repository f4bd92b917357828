//! # Router Core
//!
//! Core types shared by every crate in the LLM router:
//! - The normalized, OpenAI-shaped request/response/chunk types
//! - The static cross-vendor model catalog
//! - Vendor identifiers
//! - The error taxonomy

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
pub mod error;
pub mod request;
pub mod response;
pub mod streaming;
pub mod types;

// Re-export commonly used types
pub use catalog::{Capability, ModelCatalog, ModelMapping, Tier};
pub use error::{RouterError, RouterResult};
pub use request::{
    ChatMessage, ChatRequest, ContentPart, EmbeddingRequest, ImageRequest, MessageContent,
    MessageRole, ResponseFormat, StopSequences,
};
pub use response::{
    ChatResponse, Choice, EmbeddingDatum, EmbeddingResponse, FinishReason, ImageDatum,
    ImagesResponse, ResponseMessage, Usage,
};
pub use streaming::{ChatChunk, ChunkChoice, ChunkDelta};
pub use types::Vendor;
