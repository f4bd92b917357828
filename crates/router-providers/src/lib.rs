//! # Router Providers
//!
//! Vendor adapter implementations for the LLM router.
//!
//! Each adapter translates the OpenAI-shaped intermediate to its vendor's
//! native schema, performs the HTTP call, and translates the response (or
//! rewrites the response stream) back. All three implement the common
//! [`ProviderAdapter`] trait; there is no shared base beyond the header
//! and SSE helpers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod anthropic;
pub mod google;
pub mod openai;
pub mod sse;

pub use adapter::{AdapterReply, AdapterRequest, ProviderAdapter, ReplyBody, SseFrames};
pub use anthropic::{AnthropicAdapter, AnthropicConfig};
pub use google::{GoogleAdapter, GoogleConfig};
pub use openai::{OpenAiAdapter, OpenAiConfig};
