//! HTTP 网关层 — 对外契约：健康检查、推理与聊天端点、CORS 与错误信封
//!
//! Gateway HTTP surface. Validates request shape, delegates to router →
//! backend → normalizer, and renders either the canonical envelope or the
//! wire error envelope. This is the single place failures become HTTP.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::backends::{
    build_http_client, FinetunedBackend, LocalOnnxBackend, OpenAiBackend, TextBackend,
};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::normalize::normalize;
use crate::router::ProviderRouter;
use crate::types::{
    ChatRequest, ChatResponse, InferRequest, InferResponse, ProviderKind, Usage,
};

/// Header carrying the per-request provider hint.
pub const PROVIDER_HEADER: &str = "x-llm";

/// Generation bound applied to chat requests (the chat contract carries no
/// explicit length field).
const CHAT_MAX_NEW_TOKENS: u32 = 256;

/// Process-wide state shared by every request handler. Immutable after
/// startup.
pub struct AppState {
    pub config: GatewayConfig,
    pub router: ProviderRouter,
    pub local: Option<Arc<LocalOnnxBackend>>,
    pub finetuned: Option<FinetunedBackend>,
    pub general: Option<OpenAiBackend>,
}

/// Construct the shared state: one pooled HTTP client, remote backends built
/// once from configuration, router derived from what is actually available.
pub fn build_state(config: GatewayConfig, local: Option<Arc<LocalOnnxBackend>>) -> Result<AppState> {
    let client = build_http_client(config.remote_timeout)?;

    let finetuned = config.hf_endpoint.clone().map(|endpoint| {
        FinetunedBackend::new(client.clone(), endpoint, config.hf_token.clone())
    });
    let general = config.openai_api_key.clone().map(|key| {
        OpenAiBackend::new(
            client.clone(),
            config.openai_base_url.clone(),
            key,
            config.openai_model.clone(),
        )
    });

    let router = ProviderRouter::new(&config, local.is_some());
    Ok(AppState {
        config,
        router,
        local,
        finetuned,
        general,
    })
}

/// Build the axum application with routes and CORS policy.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .route("/health", get(health))
        .route("/api/health", get(api_health))
        .route("/infer", post(infer))
        .route("/api/chat", post(chat))
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn api_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "provider_default": state.router.default_provider().as_str(),
    }))
}

/// Undeserializable bodies go through the same error envelope as every other
/// client failure instead of axum's plain-text rejection.
fn reject_body(rejection: JsonRejection) -> GatewayError {
    GatewayError::client_request(rejection.body_text())
}

/// Flat-prompt inference against the local model only.
async fn infer(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<InferRequest>, JsonRejection>,
) -> Result<Json<InferResponse>> {
    let Json(request) = payload.map_err(reject_body)?;
    if request.prompt.trim().is_empty() {
        return Err(GatewayError::client_request("prompt must not be empty"));
    }
    let requested = request
        .max_new_tokens
        .unwrap_or(state.config.max_new_tokens_default);
    if requested == 0 {
        return Err(GatewayError::client_request("max_new_tokens must be positive"));
    }
    let max_new_tokens = requested.min(state.config.max_new_tokens_ceiling);

    let local = state.local.as_ref().ok_or_else(|| {
        GatewayError::configuration("local generation requested but ONNX_DIR is not configured")
    })?;

    let request_id = Uuid::new_v4();
    info!(%request_id, max_new_tokens, "local inference dispatched");
    let generation = local.generate(request.prompt, max_new_tokens).await?;
    info!(
        %request_id,
        completion_tokens = generation.completion_tokens,
        finish_reason = ?generation.finish_reason,
        "local inference complete"
    );

    Ok(Json(InferResponse {
        usage: Usage::new(generation.prompt_tokens, generation.completion_tokens),
        completion: generation.completion,
        finish_reason: generation.finish_reason,
        max_new_tokens,
    }))
}

/// Chat completion routed to the hinted provider, else the configured
/// default.
async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>> {
    let Json(request) = payload.map_err(reject_body)?;
    if request.messages.is_empty() {
        return Err(GatewayError::client_request("messages must not be empty"));
    }
    if request.messages.iter().any(|m| m.content.trim().is_empty()) {
        return Err(GatewayError::client_request(
            "message content must not be empty",
        ));
    }

    let hint = headers
        .get(PROVIDER_HEADER)
        .and_then(|value| value.to_str().ok());
    let kind = state.router.resolve(hint)?;
    state.router.ensure_available(kind)?;

    let backend: &dyn TextBackend = match kind {
        ProviderKind::LocalOnnx => state.local.as_deref().map(|b| b as &dyn TextBackend),
        ProviderKind::Finetuned => state.finetuned.as_ref().map(|b| b as &dyn TextBackend),
        ProviderKind::General => state.general.as_ref().map(|b| b as &dyn TextBackend),
    }
    .ok_or_else(|| {
        GatewayError::configuration(format!("provider '{kind}' is not constructed"))
    })?;

    let request_id = Uuid::new_v4();
    info!(%request_id, provider = %kind, turns = request.messages.len(), "chat dispatched");
    let raw = backend.complete(&request.messages, CHAT_MAX_NEW_TOKENS).await?;
    let envelope = normalize(raw)?;
    info!(
        %request_id,
        provider = %envelope.provider,
        total_tokens = envelope.usage.total_tokens,
        "chat complete"
    );

    Ok(Json(ChatResponse {
        provider: envelope.provider,
        text: envelope.text,
    }))
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::ClientRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::BackendUnavailable { .. } | GatewayError::Normalization(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(%status, error = %self, "request failed");
        }
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}

/// CORS policy: only the configured allow-list of caller origins, with
/// wildcard subdomain entries honored. Methods and headers stay explicit so
/// credentialed requests remain valid.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins.to_vec();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .map(|o| origin_allowed(&allowed, o))
                .unwrap_or(false)
        }))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(PROVIDER_HEADER)])
        .allow_credentials(true)
}

/// Exact-match origins, plus `scheme://*.domain` entries matching any
/// subdomain of `domain` (but never the bare apex).
fn origin_allowed(allowed: &[String], origin: &str) -> bool {
    allowed.iter().any(|entry| {
        if let Some((scheme, host)) = entry.split_once("://") {
            if let Some(suffix) = host.strip_prefix("*.") {
                let expected_prefix = format!("{scheme}://");
                return origin
                    .strip_prefix(&expected_prefix)
                    .is_some_and(|h| h.ends_with(&format!(".{suffix}")));
            }
        }
        entry == origin
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_exact_match() {
        let allowed = vec!["http://localhost:3000".to_string()];
        assert!(origin_allowed(&allowed, "http://localhost:3000"));
        assert!(!origin_allowed(&allowed, "http://localhost:3001"));
        assert!(!origin_allowed(&allowed, "https://localhost:3000"));
    }

    #[test]
    fn test_origin_wildcard_subdomain() {
        let allowed = vec!["https://*.vercel.app".to_string()];
        assert!(origin_allowed(&allowed, "https://myapp.vercel.app"));
        assert!(origin_allowed(&allowed, "https://pr-42.myapp.vercel.app"));
        assert!(!origin_allowed(&allowed, "https://vercel.app"));
        assert!(!origin_allowed(&allowed, "http://myapp.vercel.app"));
        assert!(!origin_allowed(&allowed, "https://evilvercel.app"));
    }

    #[test]
    fn test_origin_empty_allow_list_rejects_all() {
        assert!(!origin_allowed(&[], "http://localhost:3000"));
    }
}
