//! Route table.

use crate::handlers;
use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;

/// Assemble the HTTP surface over the shared state.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/providers/status", get(handlers::providers_status))
        .route("/v1/models", get(handlers::list_models))
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/messages", post(handlers::messages))
        .route("/v1/images/generations", post(handlers::images_generations))
        .route("/v1/embeddings", post(handlers::embeddings))
        .route("/v1/queue/:job_id", get(handlers::poll_job))
        .with_state(state)
}
