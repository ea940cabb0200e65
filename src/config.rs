//! 网关配置 — 启动时从环境变量一次性构建，之后不可变
//!
//! Gateway configuration. Built once from the environment at startup and
//! passed explicitly to each component; nothing reads ambient state at call
//! time, and malformed values fail fast instead of being silently replaced
//! with guesses.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{GatewayError, Result};
use crate::types::ProviderKind;

pub const DEFAULT_MAX_NEW_TOKENS: u32 = 128;
pub const DEFAULT_MAX_NEW_TOKENS_CEILING: u32 = 2048;
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 90;
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,https://*.vercel.app";

/// Immutable, process-wide gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Directory holding the local model artifact (`tokenizer.json` + `model.onnx`).
    /// Local generation is disabled when unset.
    pub onnx_dir: Option<PathBuf>,
    /// Remote fine-tuned generation endpoint.
    pub hf_endpoint: Option<String>,
    /// Bearer credential for the fine-tuned endpoint.
    pub hf_token: Option<String>,
    /// API key for the general chat backend.
    pub openai_api_key: Option<String>,
    /// Model identifier for the general chat backend.
    pub openai_model: String,
    /// Base URL of the general chat backend (overridable for tests).
    pub openai_base_url: String,
    /// Backend used when a request carries no provider hint.
    pub default_provider: ProviderKind,
    /// Allowed caller origins; `*.` entries permit wildcard subdomains.
    pub cors_origins: Vec<String>,
    /// `max_new_tokens` applied when the request omits it.
    pub max_new_tokens_default: u32,
    /// Hard ceiling any requested generation length is clamped to.
    pub max_new_tokens_ceiling: u32,
    /// Hard per-call timeout for remote backends.
    pub remote_timeout: Duration,
    /// Address the HTTP surface binds to.
    pub bind_addr: SocketAddr,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            onnx_dir: None,
            hf_endpoint: None,
            hf_token: None,
            openai_api_key: None,
            openai_model: "gpt-5-mini".to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            default_provider: ProviderKind::Finetuned,
            cors_origins: parse_origins(DEFAULT_CORS_ORIGINS),
            max_new_tokens_default: DEFAULT_MAX_NEW_TOKENS,
            max_new_tokens_ceiling: DEFAULT_MAX_NEW_TOKENS_CEILING,
            remote_timeout: Duration::from_secs(DEFAULT_REMOTE_TIMEOUT_SECS),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
        }
    }
}

impl GatewayConfig {
    /// Read the configuration from the environment.
    ///
    /// Recognized variables: `ONNX_DIR`, `HF_INFERENCE_URL`, `HF_TOKEN`,
    /// `OPENAI_API_KEY`, `OPENAI_MODEL`, `OPENAI_BASE_URL`,
    /// `PROVIDER_DEFAULT`, `CORS_ORIGINS`, `MAX_NEW_TOKENS_DEFAULT`,
    /// `MAX_NEW_TOKENS_CEILING`, `REMOTE_TIMEOUT_SECS`, `GATEWAY_ADDR`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let hf_endpoint = env_opt("HF_INFERENCE_URL");
        if let Some(ref endpoint) = hf_endpoint {
            Url::parse(endpoint).map_err(|e| {
                GatewayError::configuration(format!("HF_INFERENCE_URL is not a valid URL: {e}"))
            })?;
        }

        let default_provider = match env_opt("PROVIDER_DEFAULT") {
            Some(raw) => raw.parse::<ProviderKind>().map_err(|_| {
                GatewayError::configuration(format!(
                    "PROVIDER_DEFAULT '{raw}' is not a recognized provider"
                ))
            })?,
            None => defaults.default_provider,
        };

        let max_new_tokens_default =
            env_parse("MAX_NEW_TOKENS_DEFAULT", defaults.max_new_tokens_default)?;
        let max_new_tokens_ceiling =
            env_parse("MAX_NEW_TOKENS_CEILING", defaults.max_new_tokens_ceiling)?;
        if max_new_tokens_default == 0 || max_new_tokens_ceiling == 0 {
            return Err(GatewayError::configuration(
                "generation length limits must be positive",
            ));
        }

        Ok(Self {
            onnx_dir: env_opt("ONNX_DIR").map(PathBuf::from),
            hf_endpoint,
            hf_token: env_opt("HF_TOKEN"),
            openai_api_key: env_opt("OPENAI_API_KEY"),
            openai_model: env_opt("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            openai_base_url: env_opt("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            default_provider,
            cors_origins: env_opt("CORS_ORIGINS")
                .map(|raw| parse_origins(&raw))
                .unwrap_or(defaults.cors_origins),
            max_new_tokens_default,
            max_new_tokens_ceiling,
            remote_timeout: Duration::from_secs(env_parse(
                "REMOTE_TIMEOUT_SECS",
                DEFAULT_REMOTE_TIMEOUT_SECS,
            )?),
            bind_addr: env_parse("GATEWAY_ADDR", defaults.bind_addr)?,
        })
    }
}

/// Read an env var, treating empty strings as unset.
fn env_opt(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

/// Parse an env var, failing fast on malformed values.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env_opt(key) {
        Some(raw) => raw.parse::<T>().map_err(|_| {
            GatewayError::configuration(format!("{key} has unparseable value '{raw}'"))
        }),
        None => Ok(default),
    }
}

/// Split a comma-separated origin list, dropping empty entries.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins() {
        let origins = parse_origins("http://localhost:3000, https://*.vercel.app ,");
        assert_eq!(
            origins,
            vec!["http://localhost:3000", "https://*.vercel.app"]
        );
    }

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.default_provider, ProviderKind::Finetuned);
        assert_eq!(config.max_new_tokens_default, 128);
        assert_eq!(config.max_new_tokens_ceiling, 2048);
        assert_eq!(config.remote_timeout, Duration::from_secs(90));
        assert!(config.onnx_dir.is_none());
    }
}
