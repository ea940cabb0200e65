//! 网关统一错误类型 — 将请求、配置、后端与规范化失败汇总为可操作的分类
//!
//! Unified error type for the inference gateway. Aggregates low-level failures
//! into the categories the HTTP layer renders: bad request, bad deployment,
//! backend failure, unrecoverable response shape, and fatal startup.

use thiserror::Error;

/// Unified error type for the gateway.
///
/// The HTTP surface is the single place these are rendered into the wire
/// error envelope; everything below it propagates them unmodified.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed or missing request fields, or an unrecognized provider hint.
    #[error("invalid request: {0}")]
    ClientRequest(String),

    /// The selected provider lacks required configuration (endpoint,
    /// credential, or model artifact). Distinct from `ClientRequest` so
    /// operators can tell "bad request" from "bad deployment".
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network failure, timeout, or non-success status from a backend call.
    /// Never retried by the gateway; retry policy belongs to the caller.
    #[error("backend unavailable{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    BackendUnavailable {
        status: Option<u16>,
        message: String,
    },

    /// The backend responded, but in a shape with no recoverable text.
    #[error("normalization error: {0}")]
    Normalization(String),

    /// Local model/tokenizer failed to load. Aborts process startup rather
    /// than serving degraded traffic.
    #[error("startup error: {0}")]
    Startup(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    pub fn client_request(msg: impl Into<String>) -> Self {
        GatewayError::ClientRequest(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        GatewayError::Configuration(msg.into())
    }

    pub fn backend(status: Option<u16>, msg: impl Into<String>) -> Self {
        GatewayError::BackendUnavailable {
            status,
            message: msg.into(),
        }
    }

    pub fn normalization(msg: impl Into<String>) -> Self {
        GatewayError::Normalization(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display_includes_status() {
        let err = GatewayError::backend(Some(503), "endpoint overloaded");
        assert_eq!(
            err.to_string(),
            "backend unavailable (HTTP 503): endpoint overloaded"
        );
    }

    #[test]
    fn test_backend_error_display_without_status() {
        let err = GatewayError::backend(None, "connect timeout");
        assert_eq!(err.to_string(), "backend unavailable: connect timeout");
    }
}
