//! 响应规范化 — 将各后端的原始响应折叠为统一的补全信封
//!
//! Response normalizer. Folds every [`RawBackendResponse`] variant into the
//! canonical [`CompletionEnvelope`] with an exhaustive match, so a new
//! backend shape cannot slip through unhandled.

use serde_json::Value;

use crate::backends::{RawBackendResponse, ASSISTANT_CUE};
use crate::error::{GatewayError, Result};
use crate::types::{CompletionEnvelope, FinishReason, ProviderKind, Usage};

/// Convert one raw backend response into the canonical envelope.
pub fn normalize(raw: RawBackendResponse) -> Result<CompletionEnvelope> {
    match raw {
        RawBackendResponse::Local(generation) => Ok(CompletionEnvelope {
            provider: ProviderKind::LocalOnnx,
            text: generation.completion,
            finish_reason: generation.finish_reason,
            usage: Usage::new(generation.prompt_tokens, generation.completion_tokens),
        }),
        RawBackendResponse::Finetuned(body) => normalize_finetuned(body),
        RawBackendResponse::General(body) => normalize_general(body),
    }
}

/// The fine-tuned endpoint answers in one of three documented shapes:
/// a list whose first element holds `generated_text`, an object holding
/// `generated_text` directly, or anything else — which is serialized to text
/// verbatim as a last resort rather than dropped. The endpoint reports no
/// token usage, so usage stays zeroed rather than estimated.
fn normalize_finetuned(body: Value) -> Result<CompletionEnvelope> {
    let generated = body
        .as_array()
        .and_then(|items| items.first())
        .and_then(|item| item.get("generated_text"))
        .and_then(Value::as_str)
        .or_else(|| body.get("generated_text").and_then(Value::as_str));

    let text = match generated {
        Some(raw) => strip_transcript_echo(raw),
        None => serde_json::to_string(&body)?,
    };

    Ok(CompletionEnvelope {
        provider: ProviderKind::Finetuned,
        text,
        finish_reason: FinishReason::Stop,
        usage: Usage::default(),
    })
}

/// OpenAI-style shape: the first choice's message content. A response with
/// no choices is a normalization failure, never an empty-string success.
fn normalize_general(body: Value) -> Result<CompletionEnvelope> {
    let text = body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| {
            GatewayError::normalization("chat response contained no choices with message content")
        })?;

    let finish_reason = match body
        .pointer("/choices/0/finish_reason")
        .and_then(Value::as_str)
    {
        Some("length") => FinishReason::Length,
        _ => FinishReason::Stop,
    };

    let usage = body
        .get("usage")
        .map(|u| Usage {
            prompt_tokens: u["prompt_tokens"].as_u64().unwrap_or(0),
            completion_tokens: u["completion_tokens"].as_u64().unwrap_or(0),
            total_tokens: u["total_tokens"].as_u64().unwrap_or(0),
        })
        .unwrap_or_default();

    Ok(CompletionEnvelope {
        provider: ProviderKind::General,
        text,
        finish_reason,
        usage,
    })
}

/// Hosted fine-tuned endpoints echo the submitted transcript. Keep only the
/// portion after the last assistant cue; text without one passes through
/// trimmed.
fn strip_transcript_echo(text: &str) -> String {
    match text.rfind(ASSISTANT_CUE) {
        Some(idx) => text[idx + ASSISTANT_CUE.len()..].trim().to_string(),
        None => text.trim().to_string(),
    }
}
