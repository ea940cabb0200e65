//! 微调端点客户端 — 将聊天轮次拼接为纯文本转写并调用托管推理端点
//!
//! Client for the hosted fine-tuned endpoint. The endpoint accepts only plain
//! text, so chat turns are flattened into a transcript before submission; the
//! raw JSON body comes back untouched for the normalizer.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::types::{message::ChatMessage, ProviderKind};

use super::{
    check_status, render_transcript, send_error, RawBackendResponse, TextBackend,
    REMOTE_TEMPERATURE,
};

/// Remote fine-tuned text-generation backend.
#[derive(Debug, Clone)]
pub struct FinetunedBackend {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl FinetunedBackend {
    pub fn new(client: reqwest::Client, endpoint: String, token: Option<String>) -> Self {
        Self {
            client,
            endpoint,
            token,
        }
    }
}

#[async_trait]
impl TextBackend for FinetunedBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Finetuned
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        max_new_tokens: u32,
    ) -> Result<RawBackendResponse> {
        let transcript = render_transcript(messages);
        let payload = json!({
            "inputs": transcript,
            "parameters": {
                "max_new_tokens": max_new_tokens,
                "temperature": REMOTE_TEMPERATURE,
            },
        });

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| send_error(&self.endpoint, e))?;
        let response = check_status(&self.endpoint, response).await?;

        let body: Value = response.json().await.map_err(|e| {
            crate::error::GatewayError::normalization(format!(
                "fine-tuned endpoint returned invalid JSON: {e}"
            ))
        })?;

        tracing::debug!(endpoint = %self.endpoint, "fine-tuned endpoint responded");
        Ok(RawBackendResponse::Finetuned(body))
    }
}
