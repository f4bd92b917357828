//! Google Gemini adapter.
//!
//! Talks to the Google AI Studio API
//! (`generativelanguage.googleapis.com`). Chat requests translate into
//! `contents` with a `systemInstruction`, images go through the Imagen
//! predict endpoint, embeddings through `embedContent`.

use crate::adapter::{
    http_client, lowercase_headers, mint_id, send_checked, unix_now, with_cancel, AdapterReply,
    AdapterRequest, ProviderAdapter, VENDOR_TIMEOUT,
};
use crate::sse;
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use router_core::{
    Capability, ChatChunk, ChatRequest, ChatResponse, Choice, ChunkChoice, ChunkDelta,
    EmbeddingDatum, EmbeddingResponse, FinishReason, ImageDatum, ImageRequest, ImagesResponse,
    MessageRole, ResponseMessage, RouterError, RouterResult, Usage, Vendor,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Google adapter configuration.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// API key.
    pub api_key: SecretString,
    /// Base URL including the version segment.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl GoogleConfig {
    /// Configuration against the public API.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
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

/// The Google adapter.
pub struct GoogleAdapter {
    config: GoogleConfig,
    client: reqwest::Client,
}

impl GoogleAdapter {
    /// Create the adapter.
    ///
    /// # Errors
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new(config: GoogleConfig) -> RouterResult<Self> {
        let client = http_client(config.timeout)?;
        Ok(Self { config, client })
    }

    fn endpoint(&self, model: &str, action: &str, sse: bool) -> String {
        let key = self.config.api_key.expose_secret();
        let alt = if sse { "&alt=sse" } else { "" };
        format!(
            "{}/models/{model}:{action}?key={key}{alt}",
            self.config.base_url
        )
    }

    fn transform_request(request: &ChatRequest) -> GoogleRequest {
        let system = request.system_text();
        let contents = request
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| GoogleContent {
                role: Some(
                    if m.role == MessageRole::Assistant {
                        "model"
                    } else {
                        "user"
                    }
                    .to_string(),
                ),
                parts: vec![GooglePart {
                    text: Some(m.content.flattened_text()),
                }],
            })
            .collect();

        let json_mode = request
            .response_format
            .as_ref()
            .is_some_and(|f| f.format_type == "json_object");

        GoogleRequest {
            contents,
            system_instruction: (!system.is_empty()).then(|| GoogleContent {
                role: None,
                parts: vec![GooglePart { text: Some(system) }],
            }),
            generation_config: Some(GoogleGenerationConfig {
                temperature: request.temperature,
                top_p: request.top_p,
                max_output_tokens: request.max_tokens,
                candidate_count: request.n,
                stop_sequences: request.stop.as_ref().map(|s| s.to_vec()),
                response_mime_type: json_mode.then(|| "application/json".to_string()),
            }),
        }
    }

    fn transform_response(response: GoogleResponse, requested_model: &str) -> ChatResponse {
        let choices = response
            .candidates
            .into_iter()
            .enumerate()
            .map(|(index, candidate)| Choice {
                index: index as u32,
                message: ResponseMessage::assistant(candidate.text()),
                finish_reason: candidate.finish_reason.as_deref().map(map_finish_reason),
            })
            .collect();

        ChatResponse {
            id: mint_id("chatcmpl"),
            object: "chat.completion".to_string(),
            created: unix_now(),
            model: requested_model.to_string(),
            choices,
            usage: response.usage_metadata.map(GoogleUsageMetadata::to_usage).unwrap_or_default(),
        }
    }

    async fn call_chat(
        &self,
        request: AdapterRequest<'_>,
        cancel: &CancellationToken,
    ) -> RouterResult<AdapterReply> {
        let chat: ChatRequest = serde_json::from_value(request.body.clone())
            .map_err(|e| RouterError::validation(e.to_string(), "invalid_request"))?;
        let streaming = chat.stream;
        let native = Self::transform_request(&chat);

        let action = if streaming {
            "streamGenerateContent"
        } else {
            "generateContent"
        };
        let url = self.endpoint(request.vendor_model, action, streaming);
        debug!(model = %request.vendor_model, streaming, "dispatching to google");

        let http = self.client.post(&url).json(&native);
        let response = with_cancel(cancel, send_checked(Vendor::Google, http)).await?;
        let status = response.status().as_u16();
        let headers = lowercase_headers(response.headers());

        if streaming {
            let frames = rewrite_stream(
                sse::data_events(response, Vendor::Google, cancel.clone()),
                request.requested_model.to_string(),
            );
            return Ok(AdapterReply::stream(status, headers, frames));
        }

        let native: GoogleResponse = response
            .json()
            .await
            .map_err(|e| RouterError::transport(Vendor::Google, format!("body: {e}")))?;
        let translated = Self::transform_response(native, request.requested_model);
        let json = serde_json::to_value(translated)
            .map_err(|e| RouterError::internal(format!("response serialization: {e}")))?;

        Ok(AdapterReply::json(status, headers, json))
    }

    async fn call_images(
        &self,
        request: AdapterRequest<'_>,
        cancel: &CancellationToken,
    ) -> RouterResult<AdapterReply> {
        let image: ImageRequest = serde_json::from_value(request.body.clone())
            .map_err(|e| RouterError::validation(e.to_string(), "invalid_request"))?;

        let native = serde_json::json!({
            "instances": [{"prompt": image.prompt}],
            "parameters": {"sampleCount": image.n.unwrap_or(1)}
        });
        let url = self.endpoint(request.vendor_model, "predict", false);

        let http = self.client.post(&url).json(&native);
        let response = with_cancel(cancel, send_checked(Vendor::Google, http)).await?;
        let status = response.status().as_u16();
        let headers = lowercase_headers(response.headers());

        let native: GooglePredictResponse = response
            .json()
            .await
            .map_err(|e| RouterError::transport(Vendor::Google, format!("body: {e}")))?;

        let translated = ImagesResponse {
            created: unix_now(),
            data: native
                .predictions
                .into_iter()
                .map(|p| ImageDatum {
                    b64_json: Some(p.bytes_base64_encoded),
                    url: None,
                    revised_prompt: Some(image.prompt.clone()),
                })
                .collect(),
        };
        let json = serde_json::to_value(translated)
            .map_err(|e| RouterError::internal(format!("response serialization: {e}")))?;

        Ok(AdapterReply::json(status, headers, json))
    }

    async fn call_embeddings(
        &self,
        request: AdapterRequest<'_>,
        cancel: &CancellationToken,
    ) -> RouterResult<AdapterReply> {
        let inputs: Vec<String> = match request.body.get("input") {
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => {
                return Err(RouterError::validation(
                    "input is required",
                    "missing_input",
                ))
            }
        };

        let model_path = format!("models/{}", request.vendor_model);
        let native = serde_json::json!({
            "requests": inputs
                .iter()
                .map(|text| serde_json::json!({
                    "model": model_path,
                    "content": {"parts": [{"text": text}]}
                }))
                .collect::<Vec<_>>()
        });
        let url = self.endpoint(request.vendor_model, "batchEmbedContents", false);

        let http = self.client.post(&url).json(&native);
        let response = with_cancel(cancel, send_checked(Vendor::Google, http)).await?;
        let status = response.status().as_u16();
        let headers = lowercase_headers(response.headers());

        let native: GoogleBatchEmbedResponse = response
            .json()
            .await
            .map_err(|e| RouterError::transport(Vendor::Google, format!("body: {e}")))?;

        let translated = EmbeddingResponse {
            object: "list".to_string(),
            data: native
                .embeddings
                .into_iter()
                .enumerate()
                .map(|(index, e)| EmbeddingDatum {
                    object: "embedding".to_string(),
                    index: index as u32,
                    embedding: e.values,
                })
                .collect(),
            model: request.requested_model.to_string(),
            usage: Usage::default(),
        };
        let json = serde_json::to_value(translated)
            .map_err(|e| RouterError::internal(format!("response serialization: {e}")))?;

        Ok(AdapterReply::json(status, headers, json))
    }
}

fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" => FinishReason::ContentFilter,
        // STOP and anything unrecognized read as a normal stop.
        _ => FinishReason::Stop,
    }
}

/// Rewrite the Google SSE stream into OpenAI chunks: one chunk per upstream
/// data line, then a terminating `[DONE]` once the input is exhausted.
fn rewrite_stream(
    events: impl futures::Stream<Item = RouterResult<String>> + Send + 'static,
    requested_model: String,
) -> crate::adapter::SseFrames {
    let stream_id = mint_id("chatcmpl");
    let created = unix_now();

    sse::boxed(try_stream! {
        let mut events = std::pin::pin!(events);
        while let Some(event) = events.next().await {
            let payload = event?;
            let Ok(native) = serde_json::from_str::<GoogleResponse>(&payload) else {
                continue;
            };
            let Some(candidate) = native.candidates.into_iter().next() else {
                continue;
            };

            let text = candidate.text();
            let chunk = ChatChunk {
                id: stream_id.clone(),
                object: "chat.completion.chunk".to_string(),
                created,
                model: requested_model.clone(),
                choices: vec![ChunkChoice {
                    index: 0,
                    delta: ChunkDelta {
                        role: Some(MessageRole::Assistant),
                        content: (!text.is_empty()).then_some(text),
                    },
                    finish_reason: candidate.finish_reason.as_deref().map(map_finish_reason),
                }],
            };
            yield sse::frame(&serde_json::to_string(&chunk).map_err(|e| {
                RouterError::internal(format!("chunk serialization: {e}"))
            })?);
        }

        yield sse::done_frame();
    })
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Google
    }

    async fn call(
        &self,
        request: AdapterRequest<'_>,
        cancel: &CancellationToken,
    ) -> RouterResult<AdapterReply> {
        match request.capability {
            Capability::Chat => self.call_chat(request, cancel).await,
            Capability::Images => self.call_images(request, cancel).await,
            Capability::Embeddings => self.call_embeddings(request, cancel).await,
        }
    }
}

// Google wire types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleRequest {
    contents: Vec<GoogleContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GoogleContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GoogleGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GoogleContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GooglePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    candidate_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleResponse {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
    #[serde(default)]
    usage_metadata: Option<GoogleUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleCandidate {
    #[serde(default)]
    content: Option<GoogleContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

impl GoogleCandidate {
    fn text(&self) -> String {
        self.content
            .as_ref()
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: Option<u32>,
    #[serde(default)]
    total_token_count: Option<u32>,
}

impl GoogleUsageMetadata {
    fn to_usage(self) -> Usage {
        let completion = self.candidates_token_count.unwrap_or(0);
        Usage {
            prompt_tokens: self.prompt_token_count,
            completion_tokens: completion,
            total_tokens: self
                .total_token_count
                .unwrap_or(self.prompt_token_count + completion),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GooglePredictResponse {
    #[serde(default)]
    predictions: Vec<GooglePrediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GooglePrediction {
    bytes_base64_encoded: String,
}

#[derive(Debug, Deserialize)]
struct GoogleBatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<GoogleEmbedding>,
}

#[derive(Debug, Deserialize)]
struct GoogleEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}
