//! Integration tests for the gateway HTTP surface: routing, error envelope,
//! and end-to-end normalization against mocked remote backends.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use mockito::Matcher;
use serde_json::{json, Value};
use tower::ServiceExt;

use ft_gateway::server::{self, AppState};
use ft_gateway::{GatewayConfig, ProviderKind};

fn app_with(config: GatewayConfig) -> axum::Router {
    let state: AppState = server::build_state(config, None).expect("state should build");
    server::build_app(Arc::new(state))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

#[tokio::test]
async fn health_is_idempotent() {
    let app = app_with(GatewayConfig::default());
    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "ok"}));
    }
}

#[tokio::test]
async fn api_health_reports_default_provider() {
    let mut config = GatewayConfig::default();
    config.default_provider = ProviderKind::General;
    let app = app_with(config);

    let response = app
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["provider_default"], "openai");
}

#[tokio::test]
async fn chat_with_unconfigured_finetuned_is_configuration_error() {
    // No HF_INFERENCE_URL configured; selecting the fine-tuned provider must
    // be a distinct configuration failure, not a crash or generic 500.
    let app = app_with(GatewayConfig::default());

    let mut request = post_json("/api/chat", json!({"messages": [{"role": "user", "content": "hi"}]}));
    request
        .headers_mut()
        .insert("x-llm", "finetuned".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("HF_INFERENCE_URL"));
}

#[tokio::test]
async fn chat_with_unknown_hint_is_client_error() {
    let app = app_with(GatewayConfig::default());

    let mut request = post_json("/api/chat", json!({"messages": [{"role": "user", "content": "hi"}]}));
    request
        .headers_mut()
        .insert("x-llm", "mistral".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("mistral"));
}

#[tokio::test]
async fn chat_with_empty_messages_is_client_error() {
    let app = app_with(GatewayConfig::default());
    let response = app
        .oneshot(post_json("/api/chat", json!({"messages": []})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_json_body_renders_error_envelope() {
    let app = app_with(GatewayConfig::default());
    for uri in ["/api/chat", "/infer"] {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().is_some(), "missing envelope on {uri}");
    }
}

#[tokio::test]
async fn infer_without_local_model_is_configuration_error() {
    let app = app_with(GatewayConfig::default());
    let response = app
        .oneshot(post_json("/infer", json!({"prompt": "What is EBITDA?"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn infer_rejects_empty_prompt() {
    let app = app_with(GatewayConfig::default());
    let response = app
        .oneshot(post_json("/infer", json!({"prompt": "  "})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_finetuned_end_to_end_strips_transcript() {
    let mut mock_server = mockito::Server::new_async().await;
    let mock = mock_server
        .mock("POST", "/generate")
        .match_header("authorization", "Bearer secret-token")
        .match_body(Matcher::PartialJson(json!({
            "inputs": "user: hi\nassistant:",
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"generated_text": "user: hi\nassistant: Hi! How can I help?"}]"#)
        .create_async()
        .await;

    let mut config = GatewayConfig::default();
    config.hf_endpoint = Some(format!("{}/generate", mock_server.url()));
    config.hf_token = Some("secret-token".to_string());
    let app = app_with(config);

    let response = app
        .oneshot(post_json(
            "/api/chat",
            json!({"messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["provider"], "finetuned");
    assert_eq!(body["text"], "Hi! How can I help?");
    mock.assert_async().await;
}

#[tokio::test]
async fn chat_finetuned_non_success_status_is_backend_error() {
    let mut mock_server = mockito::Server::new_async().await;
    let _mock = mock_server
        .mock("POST", "/generate")
        .with_status(500)
        .with_body("upstream exploded")
        .create_async()
        .await;

    let mut config = GatewayConfig::default();
    config.hf_endpoint = Some(format!("{}/generate", mock_server.url()));
    let app = app_with(config);

    let response = app
        .oneshot(post_json(
            "/api/chat",
            json!({"messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("500"));
}

#[tokio::test]
async fn chat_general_end_to_end() {
    let mut mock_server = mockito::Server::new_async().await;
    let _mock = mock_server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::PartialJson(json!({"temperature": 0.2})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"choices":[{"message":{"content":"Hello!"},"finish_reason":"stop"}],
                "usage":{"prompt_tokens":9,"completion_tokens":2,"total_tokens":11}}"#,
        )
        .create_async()
        .await;

    let mut config = GatewayConfig::default();
    config.openai_api_key = Some("sk-test".to_string());
    config.openai_base_url = mock_server.url();
    let app = app_with(config);

    let mut request = post_json(
        "/api/chat",
        json!({"messages": [{"role": "user", "content": "hi"}]}),
    );
    request
        .headers_mut()
        .insert("x-llm", "openai".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["provider"], "openai");
    assert_eq!(body["text"], "Hello!");
}

#[tokio::test]
async fn chat_general_empty_choices_is_normalization_error() {
    let mut mock_server = mockito::Server::new_async().await;
    let _mock = mock_server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices": []}"#)
        .create_async()
        .await;

    let mut config = GatewayConfig::default();
    config.openai_api_key = Some("sk-test".to_string());
    config.openai_base_url = mock_server.url();
    config.default_provider = ProviderKind::General;
    let app = app_with(config);

    let response = app
        .oneshot(post_json(
            "/api/chat",
            json!({"messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("no choices"));
}

#[tokio::test]
async fn cors_allows_configured_origin_only() {
    let app = app_with(GatewayConfig::default());

    let allowed = app
        .clone()
        .oneshot(
            Request::get("/health")
                .header(header::ORIGIN, "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        allowed
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:3000")
    );

    let denied = app
        .oneshot(
            Request::get("/health")
                .header(header::ORIGIN, "https://evil.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(denied
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
