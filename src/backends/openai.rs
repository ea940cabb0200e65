//! OpenAI-style general chat backend. Chat turns go over the wire unmodified
//! as a structured message list; no transcript flattening.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::types::{message::ChatMessage, ProviderKind};

use super::{check_status, send_error, RawBackendResponse, TextBackend, REMOTE_TEMPERATURE};

/// General chat backend speaking the OpenAI chat-completions format.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String, model: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
            model,
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl TextBackend for OpenAiBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::General
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _max_new_tokens: u32,
    ) -> Result<RawBackendResponse> {
        let url = self.chat_url();
        let payload = json!({
            "model": self.model,
            "messages": messages,
            "temperature": REMOTE_TEMPERATURE,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| send_error(&url, e))?;
        let response = check_status(&url, response).await?;

        let body: Value = response.json().await.map_err(|e| {
            crate::error::GatewayError::normalization(format!(
                "chat endpoint returned invalid JSON: {e}"
            ))
        })?;

        tracing::debug!(model = %self.model, "general chat endpoint responded");
        Ok(RawBackendResponse::General(body))
    }
}
