//! # Router Server
//!
//! The HTTP surface: OpenAI-compatible chat/image/embedding entries, the
//! native Anthropic messages entry, health and status endpoints, and async
//! job polling. Everything stateful lives behind [`AppState`]; handlers
//! translate between wire shapes and the router's outcomes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod anthropic_api;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::{ApiError, ErrorShape};
pub use routes::build_router;
pub use state::AppState;
