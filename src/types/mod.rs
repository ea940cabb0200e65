//! 核心类型定义 — 请求、规范化响应信封与用量统计
//!
//! Core type definitions: inbound request shapes, the canonical completion
//! envelope every backend is normalized into, and token usage accounting.

pub mod message;

pub use message::{ChatMessage, ChatRole};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// One concrete text-generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Locally loaded fine-tuned ONNX model.
    LocalOnnx,
    /// Remote hosted fine-tuned endpoint (HF Inference-Endpoint shaped).
    Finetuned,
    /// Third-party general chat API (OpenAI-style).
    General,
}

impl ProviderKind {
    /// Identifier reported back to callers in the envelope.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::LocalOnnx => "local",
            ProviderKind::Finetuned => "finetuned",
            ProviderKind::General => "openai",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = GatewayError;

    /// Parse a provider hint. Unrecognized hints are a client error, never
    /// silently remapped to the default.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(ProviderKind::LocalOnnx),
            "finetuned" => Ok(ProviderKind::Finetuned),
            "openai" | "general" => Ok(ProviderKind::General),
            other => Err(GatewayError::client_request(format!(
                "unknown provider '{other}' (expected one of: local, finetuned, openai)"
            ))),
        }
    }
}

impl Serialize for ProviderKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Whether generation stopped on a natural end token or hit the length cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Length,
}

/// Token usage accounting. Zeroed, never estimated, for backends that do not
/// report it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Canonical completion returned to callers regardless of backend.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionEnvelope {
    pub provider: ProviderKind,
    pub text: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

/// Request body for `POST /infer` (single flat prompt against the local model).
#[derive(Debug, Clone, Deserialize)]
pub struct InferRequest {
    pub prompt: String,
    /// Defaults to the configured per-request generation length.
    pub max_new_tokens: Option<u32>,
}

/// Response body for `POST /infer`.
#[derive(Debug, Clone, Serialize)]
pub struct InferResponse {
    pub completion: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub max_new_tokens: u32,
}

/// Request body for `POST /api/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

/// Response body for `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub provider: ProviderKind,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("finetuned".parse::<ProviderKind>().unwrap(), ProviderKind::Finetuned);
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::General);
        assert_eq!("general".parse::<ProviderKind>().unwrap(), ProviderKind::General);
        assert_eq!("local".parse::<ProviderKind>().unwrap(), ProviderKind::LocalOnnx);
    }

    #[test]
    fn test_provider_kind_rejects_unknown() {
        let err = "claude".parse::<ProviderKind>().unwrap_err();
        assert!(matches!(err, GatewayError::ClientRequest(_)));
    }

    #[test]
    fn test_finish_reason_serializes_lowercase() {
        assert_eq!(serde_json::to_value(FinishReason::Length).unwrap(), "length");
        assert_eq!(serde_json::to_value(FinishReason::Stop).unwrap(), "stop");
    }

    #[test]
    fn test_usage_totals() {
        let usage = Usage::new(12, 30);
        assert_eq!(usage.total_tokens, 42);
    }

    #[test]
    fn test_infer_request_optional_cap() {
        let req: InferRequest = serde_json::from_str(r#"{"prompt":"What is EBITDA?"}"#).unwrap();
        assert_eq!(req.max_new_tokens, None);
        let req: InferRequest =
            serde_json::from_str(r#"{"prompt":"x","max_new_tokens":32}"#).unwrap();
        assert_eq!(req.max_new_tokens, Some(32));
    }
}
