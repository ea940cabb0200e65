//! 后端抽象层 — 通过 trait 将本地与远程文本生成后端统一为一个契约
//!
//! Backend abstraction layer. Each concrete text-generation provider (local
//! ONNX model, hosted fine-tuned endpoint, OpenAI-style general API)
//! implements [`TextBackend`] behind dynamic dispatch, returning its raw,
//! provider-shaped response for the normalizer to fold into the canonical
//! envelope.

pub mod finetuned;
pub mod local_onnx;
pub mod openai;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{GatewayError, Result};
use crate::types::message::ChatMessage;

pub use finetuned::FinetunedBackend;
pub use local_onnx::{LocalGeneration, LocalOnnxBackend};
pub use openai::OpenAiBackend;

/// The cue line that terminates a flattened transcript and marks where the
/// assistant's reply begins in echoed remote output.
pub const ASSISTANT_CUE: &str = "assistant:";

/// Fixed low sampling temperature for remote calls, for reproducibility.
pub const REMOTE_TEMPERATURE: f64 = 0.2;

/// One raw backend response, tagged by provider kind. The normalizer matches
/// exhaustively over these instead of probing shapes ad hoc.
#[derive(Debug, Clone)]
pub enum RawBackendResponse {
    /// Local adapter output: already structured, passed through.
    Local(LocalGeneration),
    /// Fine-tuned endpoint body: one of several documented shapes.
    Finetuned(Value),
    /// General chat endpoint body: OpenAI-style `choices` shape.
    General(Value),
}

/// Contract every backend implements: turn chat turns plus a length bound
/// into a raw response. Implementations perform no retries and surface
/// failures unmodified.
#[async_trait]
pub trait TextBackend: Send + Sync {
    /// Provider identity reported in envelopes and logs.
    fn kind(&self) -> crate::types::ProviderKind;

    /// Run one completion against this backend.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        max_new_tokens: u32,
    ) -> Result<RawBackendResponse>;
}

/// Join chat turns into one flat string for backends that accept only plain
/// text: `"{role}: {content}"` per turn, newline-joined, terminated with a
/// bare assistant cue line.
pub fn render_transcript(messages: &[ChatMessage]) -> String {
    let mut lines: Vec<String> = messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect();
    lines.push(ASSISTANT_CUE.to_string());
    lines.join("\n")
}

/// Build the shared HTTP client used by every remote backend. One pooled
/// client, one hard per-call timeout, no retries.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| GatewayError::backend(None, format!("failed to build HTTP client: {e}")))
}

/// Map a reqwest send failure into the backend-unavailable taxonomy,
/// distinguishing timeouts in the message.
pub(crate) fn send_error(endpoint: &str, err: reqwest::Error) -> GatewayError {
    let reason = if err.is_timeout() {
        "timed out".to_string()
    } else {
        err.to_string()
    };
    GatewayError::backend(None, format!("request to {endpoint} {reason}"))
}

/// Treat a non-2xx status as a failure, carrying the status and a body
/// snippet rather than silently swallowing it.
pub(crate) async fn check_status(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    Err(GatewayError::backend(
        Some(status.as_u16()),
        format!("{endpoint} returned {status}: {snippet}"),
    ))
}
