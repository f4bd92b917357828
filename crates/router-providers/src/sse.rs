//! SSE line codec shared by the adapters.
//!
//! Upstream bodies arrive as arbitrary byte chunks; the reader here is
//! line-oriented, so output is identical for any chunking that yields the
//! same concatenation. Only `data:` payloads are surfaced; `event:`,
//! comment, and blank lines are dropped (the payloads carry their own type
//! fields where it matters).

use crate::adapter::SseFrames;
use async_stream::try_stream;
use futures_util::StreamExt;
use router_core::{RouterError, RouterResult, Vendor};
use tokio_util::sync::CancellationToken;

/// Drain complete lines out of `buffer`, returning any `data:` payloads.
fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();
    while let Some(pos) = buffer.find('\n') {
        let line: String = buffer.drain(..=pos).collect();
        let line = line.trim_end_matches(['\n', '\r']);
        if let Some(data) = line.strip_prefix("data:") {
            payloads.push(data.trim_start().to_string());
        }
    }
    payloads
}

/// Turn an upstream response body into a stream of `data:` payloads.
///
/// Ends when the body ends or the abort signal fires. Transport failures
/// mid-stream surface as a final error item.
pub fn data_events(
    response: reqwest::Response,
    vendor: Vendor,
    cancel: CancellationToken,
) -> impl futures::Stream<Item = RouterResult<String>> + Send + 'static {
    try_stream! {
        let mut bytes = response.bytes_stream();
        let mut buffer = String::new();

        loop {
            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                chunk = bytes.next() => chunk,
            };

            let Some(chunk) = chunk else { break };
            let chunk =
                chunk.map_err(|e| RouterError::transport(vendor, format!("stream: {e}")))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            for payload in drain_data_lines(&mut buffer) {
                yield payload;
            }
        }

        // A final data line without a trailing newline still counts.
        let tail = buffer.trim_end_matches('\r');
        if let Some(data) = tail.strip_prefix("data:") {
            yield data.trim_start().to_string();
        }
    }
}

/// Frame a JSON payload as one SSE line pair.
#[must_use]
pub fn frame(payload: &str) -> String {
    format!("data: {payload}\n\n")
}

/// The terminating SSE marker.
#[must_use]
pub fn done_frame() -> String {
    "data: [DONE]\n\n".to_string()
}

/// Frame a serializable value as one SSE event with an explicit event name,
/// the shape the Anthropic wire contract streams in.
pub fn named_frame<T: serde::Serialize>(event: &str, payload: &T) -> RouterResult<String> {
    let json = serde_json::to_string(payload)
        .map_err(|e| RouterError::internal(format!("stream serialization: {e}")))?;
    Ok(format!("event: {event}\ndata: {json}\n\n"))
}

/// Box a frame stream into the common [`SseFrames`] shape.
pub fn boxed<S>(stream: S) -> SseFrames
where
    S: futures::Stream<Item = RouterResult<String>> + Send + 'static,
{
    Box::pin(stream)
}
