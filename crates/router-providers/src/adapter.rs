//! The common adapter contract.

use async_trait::async_trait;
use futures::stream::BoxStream;
use router_core::{Capability, RouterError, RouterResult, Vendor};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A lazy sequence of fully framed SSE lines (`data: ...\n\n`), produced on
/// demand from the upstream body. Finite and non-restartable.
pub type SseFrames = BoxStream<'static, RouterResult<String>>;

/// One dispatch to a vendor.
#[derive(Debug, Clone, Copy)]
pub struct AdapterRequest<'a> {
    /// What kind of request this is.
    pub capability: Capability,
    /// Model name the client asked for; echoed in response bodies.
    pub requested_model: &'a str,
    /// Vendor-side model name to call out with.
    pub vendor_model: &'a str,
    /// The request body. Opaque to the router; adapters deserialize the
    /// parts they translate.
    pub body: &'a serde_json::Value,
}

/// A vendor response: status, lowercased headers, and a body that is either
/// a translated JSON document or an unconsumed rewritten stream.
#[derive(Debug)]
pub struct AdapterReply {
    /// HTTP status from the vendor.
    pub status: u16,
    /// Response headers, keys lowercased on ingress.
    pub headers: HashMap<String, String>,
    /// Translated body.
    pub body: ReplyBody,
}

/// Body of an [`AdapterReply`].
pub enum ReplyBody {
    /// Fully translated JSON document.
    Json(serde_json::Value),
    /// Rewritten SSE stream, handed to the HTTP writer lazily.
    Stream(SseFrames),
}

impl std::fmt::Debug for ReplyBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplyBody::Json(v) => f.debug_tuple("Json").field(v).finish(),
            ReplyBody::Stream(_) => f.debug_tuple("Stream").field(&"<sse stream>").finish(),
        }
    }
}

impl AdapterReply {
    /// Build a JSON reply.
    #[must_use]
    pub fn json(
        status: u16,
        headers: HashMap<String, String>,
        body: serde_json::Value,
    ) -> Self {
        Self {
            status,
            headers,
            body: ReplyBody::Json(body),
        }
    }

    /// Build a streaming reply.
    #[must_use]
    pub fn stream(status: u16, headers: HashMap<String, String>, frames: SseFrames) -> Self {
        Self {
            status,
            headers,
            body: ReplyBody::Stream(frames),
        }
    }
}

/// A vendor-specific translator implementing the common call operation.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// The vendor this adapter talks to.
    fn vendor(&self) -> Vendor;

    /// Translate, dispatch, and translate back.
    ///
    /// # Errors
    /// Vendor responses with status >= 400 surface as
    /// [`RouterError::Provider`] carrying the status, lowercased headers,
    /// and raw body; failures to reach the vendor at all surface as
    /// [`RouterError::Transport`]; a fired abort signal surfaces as
    /// [`RouterError::Cancelled`].
    async fn call(
        &self,
        request: AdapterRequest<'_>,
        cancel: &CancellationToken,
    ) -> RouterResult<AdapterReply>;
}

/// Default overall timeout for vendor HTTP clients.
pub(crate) const VENDOR_TIMEOUT: Duration = Duration::from_secs(120);

/// Build the pooled HTTP client every adapter uses.
pub(crate) fn http_client(timeout: Duration) -> RouterResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(100)
        .build()
        .map_err(|e| RouterError::internal(format!("failed to create HTTP client: {e}")))
}

/// Lowercase a response header map into the common shape.
pub(crate) fn lowercase_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

/// Race a vendor call against the abort signal.
pub(crate) async fn with_cancel<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = RouterResult<T>>,
) -> RouterResult<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(RouterError::Cancelled),
        result = fut => result,
    }
}

/// Send a translated request and split the outcome: 2xx responses come back
/// for body handling, anything else becomes the structured provider error.
pub(crate) async fn send_checked(
    vendor: Vendor,
    request: reqwest::RequestBuilder,
) -> RouterResult<reqwest::Response> {
    let response = request
        .send()
        .await
        .map_err(|e| RouterError::transport(vendor, e.to_string()))?;

    let status = response.status().as_u16();
    if status >= 400 {
        let headers = lowercase_headers(response.headers());
        let body = response.text().await.unwrap_or_default();
        return Err(RouterError::provider(vendor, status, headers, body));
    }

    Ok(response)
}

/// Mint a response id with the given prefix.
pub(crate) fn mint_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

/// Current unix timestamp for response `created` fields.
pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
