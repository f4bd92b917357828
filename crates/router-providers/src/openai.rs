//! OpenAI adapter.
//!
//! The internal intermediate already has the OpenAI wire shape, so this
//! adapter passes bodies through with the `model` field overwritten and
//! relays upstream SSE lines unchanged.

use crate::adapter::{
    http_client, lowercase_headers, send_checked, with_cancel, AdapterReply, AdapterRequest,
    ProviderAdapter, VENDOR_TIMEOUT,
};
use crate::sse;
use async_trait::async_trait;
use futures_util::StreamExt;
use router_core::{Capability, RouterError, RouterResult, Vendor};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// OpenAI adapter configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key.
    pub api_key: SecretString,
    /// Base URL including the `/v1` segment.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl OpenAiConfig {
    /// Configuration against the public API.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: VENDOR_TIMEOUT,
        }
    }

    /// Override the base URL (tests point this at a mock server).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// The OpenAI adapter.
pub struct OpenAiAdapter {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiAdapter {
    /// Create the adapter.
    ///
    /// # Errors
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new(config: OpenAiConfig) -> RouterResult<Self> {
        let client = http_client(config.timeout)?;
        Ok(Self { config, client })
    }

    fn endpoint(&self, capability: Capability) -> String {
        let path = match capability {
            Capability::Chat => "chat/completions",
            Capability::Images => "images/generations",
            Capability::Embeddings => "embeddings",
        };
        format!("{}/{path}", self.config.base_url)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::OpenAi
    }

    async fn call(
        &self,
        request: AdapterRequest<'_>,
        cancel: &CancellationToken,
    ) -> RouterResult<AdapterReply> {
        let mut body = request.body.clone();
        body["model"] = serde_json::Value::String(request.vendor_model.to_string());

        let streaming = request.capability == Capability::Chat
            && body.get("stream").and_then(serde_json::Value::as_bool) == Some(true);

        let url = self.endpoint(request.capability);
        debug!(model = %request.vendor_model, url = %url, streaming, "dispatching to openai");

        let http = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body);

        let response = with_cancel(cancel, send_checked(Vendor::OpenAi, http)).await?;
        let status = response.status().as_u16();
        let headers = lowercase_headers(response.headers());

        if streaming {
            // Upstream lines are already in the OpenAI SSE shape.
            let events = sse::data_events(response, Vendor::OpenAi, cancel.clone());
            let frames = events.map(|event| event.map(|payload| sse::frame(&payload)));
            return Ok(AdapterReply::stream(status, headers, sse::boxed(frames)));
        }

        let mut json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RouterError::transport(Vendor::OpenAi, format!("body: {e}")))?;

        // Clients see the model name they asked for, whatever we dialed.
        if json.get("model").is_some() {
            json["model"] = serde_json::Value::String(request.requested_model.to_string());
        }

        Ok(AdapterReply::json(status, headers, json))
    }
}
