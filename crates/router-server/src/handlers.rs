//! HTTP request handlers.

use crate::anthropic_api::{self, MessagesRequest};
use crate::auth;
use crate::error::{ApiError, ErrorShape};
use crate::state::{AppState, SERVICE_NAME};
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use router_core::{Capability, RouterError, RouterResult, Vendor};
use router_providers::ReplyBody;
use router_routing::{ExecuteOutcome, QueuedResult, RoutedResponse};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Vendor that actually served the request.
const PROVIDER_HEADER: &str = "x-ai-router-provider";
/// Vendor-side model name actually dialed.
const MODEL_HEADER: &str = "x-ai-router-model";
/// Correlation id, echoed when the client supplies a well-formed UUID.
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Echo a well-formed inbound `x-request-id`, otherwise mint a fresh one.
/// Anything that does not parse as a UUID is replaced, not propagated.
fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| uuid::Uuid::parse_str(v.trim()).ok())
        .map(|id| id.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn parse_json(body: &Bytes, shape: ErrorShape) -> Result<Value, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::invalid_request(format!("invalid JSON body: {e}"), "invalid_json", shape))
}

fn set_header(response: &mut Response, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        response.headers_mut().insert(name, value);
    }
}

/// Attach the routed-reply headers every response carries.
fn routed_headers(response: &mut Response, vendor: Vendor, vendor_model: &str, request_id: &str) {
    set_header(response, PROVIDER_HEADER, vendor.as_str());
    set_header(response, MODEL_HEADER, vendor_model);
    set_header(response, REQUEST_ID_HEADER, request_id);
}

/// Wrap rewritten SSE frames in a streaming response with the framing
/// headers SSE clients and proxies expect.
fn sse_response(frames: router_providers::SseFrames) -> Response {
    let body = Body::from_stream(frames.map(|frame| frame.map(Bytes::from)));
    let mut response = Response::new(body);
    set_header(&mut response, "content-type", "text/event-stream");
    set_header(&mut response, "cache-control", "no-cache");
    set_header(&mut response, "connection", "keep-alive");
    set_header(&mut response, "x-accel-buffering", "no");
    response
}

fn queued_envelope(job_id: &str, estimated_wait_ms: u64, request_id: &str) -> Response {
    let mut response = (
        StatusCode::ACCEPTED,
        Json(json!({
            "id": job_id,
            "object": "queue.job",
            "status": "pending",
            "estimated_wait_ms": estimated_wait_ms,
            "poll_url": format!("/v1/queue/{job_id}"),
        })),
    )
        .into_response();
    set_header(&mut response, REQUEST_ID_HEADER, request_id);
    response
}

/// Run the routing loop on its own task with the abort signal tied to the
/// connection: when the client disconnects, hyper drops this handler
/// future, the drop guard fires the token, and the detached task aborts
/// the in-flight vendor call instead of letting it run to completion.
async fn execute_guarded(
    state: &AppState,
    capability: Capability,
    model: &str,
    body: Value,
) -> RouterResult<ExecuteOutcome> {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let router = Arc::clone(&state.router);
    let model = model.to_string();
    let task = tokio::spawn(async move {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(RouterError::Cancelled),
            result = router.execute(&model, capability, &cancel, body) => result,
        }
    });

    let result = match task.await {
        Ok(result) => result,
        Err(e) => Err(RouterError::internal(format!("routing task failed: {e}"))),
    };
    let _ = guard.disarm();
    result
}

/// Run one request through the router and translate the outcome for an
/// OpenAI-shaped path.
async fn dispatch_openai(
    state: &AppState,
    capability: Capability,
    model: &str,
    body: Value,
    request_id: &str,
) -> Response {
    let started = Instant::now();

    match execute_guarded(state, capability, model, body).await {
        Ok(ExecuteOutcome::Completed(routed)) => {
            info!(
                request_id = %request_id,
                provider = %routed.vendor,
                model = %routed.vendor_model,
                latency_ms = started.elapsed().as_millis() as u64,
                "request completed"
            );
            let RoutedResponse {
                vendor,
                vendor_model,
                reply,
                ..
            } = routed;
            let mut response = match reply.body {
                ReplyBody::Json(value) => (StatusCode::OK, Json(value)).into_response(),
                ReplyBody::Stream(frames) => sse_response(frames),
            };
            routed_headers(&mut response, vendor, &vendor_model, request_id);
            response
        }
        Ok(ExecuteOutcome::Queued {
            job_id,
            estimated_wait_ms,
        }) => queued_envelope(&job_id, estimated_wait_ms, request_id),
        Err(error) => {
            debug!(request_id = %request_id, error = %error, "request failed");
            let mut response = ApiError::from_router(&error, ErrorShape::OpenAi).into_response();
            set_header(&mut response, REQUEST_ID_HEADER, request_id);
            response
        }
    }
}

/// POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let shape = ErrorShape::OpenAi;
    if !auth::authorized(&headers, &state.router_api_key) {
        return ApiError::unauthorized(shape).into_response();
    }
    let request_id = request_id(&headers);
    let body = match parse_json(&body, shape) {
        Ok(body) => body,
        Err(e) => return e.into_response(),
    };

    let Some(model) = body.get("model").and_then(Value::as_str).filter(|m| !m.is_empty())
    else {
        return ApiError::invalid_request("model is required", "missing_model", shape)
            .into_response();
    };
    let has_messages = body
        .get("messages")
        .and_then(Value::as_array)
        .is_some_and(|m| !m.is_empty());
    if !has_messages {
        return ApiError::invalid_request(
            "messages must be a non-empty array",
            "missing_messages",
            shape,
        )
        .into_response();
    }

    let model = model.to_string();
    dispatch_openai(&state, Capability::Chat, &model, body, &request_id).await
}

/// POST /v1/images/generations
pub async fn images_generations(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let shape = ErrorShape::OpenAi;
    if !auth::authorized(&headers, &state.router_api_key) {
        return ApiError::unauthorized(shape).into_response();
    }
    let request_id = request_id(&headers);
    let body = match parse_json(&body, shape) {
        Ok(body) => body,
        Err(e) => return e.into_response(),
    };

    if body.get("prompt").and_then(Value::as_str).map_or(true, str::is_empty) {
        return ApiError::invalid_request("prompt is required", "missing_prompt", shape)
            .into_response();
    }
    let model = body
        .get("model")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or("dall-e-3")
        .to_string();

    dispatch_openai(&state, Capability::Images, &model, body, &request_id).await
}

/// POST /v1/embeddings
pub async fn embeddings(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let shape = ErrorShape::OpenAi;
    if !auth::authorized(&headers, &state.router_api_key) {
        return ApiError::unauthorized(shape).into_response();
    }
    let request_id = request_id(&headers);
    let body = match parse_json(&body, shape) {
        Ok(body) => body,
        Err(e) => return e.into_response(),
    };

    if body.get("input").is_none() {
        return ApiError::invalid_request("input is required", "missing_input", shape)
            .into_response();
    }
    let model = body
        .get("model")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or("text-embedding-3-small")
        .to_string();

    dispatch_openai(&state, Capability::Embeddings, &model, body, &request_id).await
}

/// POST /v1/messages, the native Anthropic entry.
pub async fn messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let shape = ErrorShape::Anthropic;
    if !auth::authorized(&headers, &state.router_api_key) {
        return ApiError::unauthorized(shape).into_response();
    }
    let request_id = request_id(&headers);

    let request: MessagesRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return ApiError::invalid_request(format!("invalid request: {e}"), "invalid_json", shape)
                .into_response()
        }
    };
    if request.model.is_empty() {
        return ApiError::invalid_request("model is required", "missing_model", shape)
            .into_response();
    }
    if request.messages.is_empty() {
        return ApiError::invalid_request(
            "messages must be a non-empty array",
            "missing_messages",
            shape,
        )
        .into_response();
    }

    let internal = request.to_internal();

    match execute_guarded(&state, Capability::Chat, &request.model, internal).await {
        Ok(ExecuteOutcome::Completed(routed)) => {
            let RoutedResponse {
                vendor,
                vendor_model,
                reply,
                ..
            } = routed;
            let mut response = match reply.body {
                ReplyBody::Json(value) => {
                    let translated = anthropic_api::to_messages_response(&value, &request.model);
                    (StatusCode::OK, Json(translated)).into_response()
                }
                ReplyBody::Stream(frames) => {
                    sse_response(anthropic_api::to_messages_stream(frames, request.model.clone()))
                }
            };
            routed_headers(&mut response, vendor, &vendor_model, &request_id);
            response
        }
        Ok(ExecuteOutcome::Queued {
            job_id,
            estimated_wait_ms,
        }) => queued_envelope(&job_id, estimated_wait_ms, &request_id),
        Err(error) => {
            let mut response = ApiError::from_router(&error, shape).into_response();
            set_header(&mut response, REQUEST_ID_HEADER, &request_id);
            response
        }
    }
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /v1/providers/status. No auth; the operator snapshot.
pub async fn providers_status(State(state): State<AppState>) -> Json<Value> {
    let limits = state.tracker.all_states();

    let providers: Vec<Value> = state
        .router
        .registered_vendors()
        .into_iter()
        .map(|vendor| {
            let breaker = state.breakers.get_or_create(vendor).snapshot();
            let models: Vec<Value> = limits
                .iter()
                .filter(|(v, _, _)| *v == vendor)
                .map(|(_, model, s)| {
                    json!({
                        "model": model,
                        "cooling_down": s.cooling_down,
                        "cooldown_until": s.cooldown_until,
                        "remaining_requests": s.remaining_requests,
                        "remaining_tokens": s.remaining_tokens,
                    })
                })
                .collect();
            json!({
                "vendor": vendor.as_str(),
                "circuit_state": breaker.state.to_string(),
                "failure_count": breaker.failure_count,
                "models": models,
            })
        })
        .collect();

    Json(json!({
        "providers": providers,
        "queue_size": state.queue.depth().await,
    }))
}

/// GET /v1/models: the canonical names the catalog accepts.
pub async fn list_models(State(state): State<AppState>) -> Json<Value> {
    let data: Vec<Value> = state
        .router
        .catalog()
        .canonical_names()
        .into_iter()
        .map(|id| json!({"id": id, "object": "model", "owned_by": "system"}))
        .collect();
    Json(json!({"object": "list", "data": data}))
}

/// GET /v1/queue/:job_id, async job polling.
pub async fn poll_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    use router_queue::{JobStatus, PollOutcome};
    let shape = ErrorShape::OpenAi;

    match state.queue.poll(&job_id).await {
        PollOutcome::NotFound => {
            ApiError::not_found(format!("no job {job_id}"), shape).into_response()
        }
        PollOutcome::Waiting(status) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "id": job_id,
                "object": "queue.job",
                "status": status,
            })),
        )
            .into_response(),
        PollOutcome::Finished(outcome) => match outcome.status {
            JobStatus::Done => {
                let result = outcome.result.unwrap_or(Value::Null);
                match serde_json::from_value::<QueuedResult>(result) {
                    Ok(queued) => {
                        let mut response =
                            (StatusCode::OK, Json(queued.response)).into_response();
                        set_header(&mut response, PROVIDER_HEADER, queued.vendor.as_str());
                        set_header(&mut response, MODEL_HEADER, &queued.vendor_model);
                        response
                    }
                    Err(_) => ApiError {
                        status: StatusCode::INTERNAL_SERVER_ERROR,
                        error_type: "api_error",
                        code: Some("api_error".to_string()),
                        message: "stored job result was unreadable".to_string(),
                        shape,
                    }
                    .into_response(),
                }
            }
            JobStatus::Expired => ApiError {
                status: StatusCode::REQUEST_TIMEOUT,
                error_type: "timeout_error",
                code: Some("queue_timeout".to_string()),
                message: "no provider recovered before the request deadline".to_string(),
                shape,
            }
            .into_response(),
            _ => ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                error_type: "api_error",
                code: Some("api_error".to_string()),
                message: outcome
                    .error
                    .unwrap_or_else(|| "job failed".to_string()),
                shape,
            }
            .into_response(),
        },
    }
}
