//! Provider 路由 — 每个请求精确选择一个后端并校验其可用前提
//!
//! Provider router. Picks exactly one backend per request: an explicit
//! per-request hint wins over the configured default, an unrecognized hint is
//! a client error, and a selected provider missing its required configuration
//! is surfaced as a configuration failure before any dispatch. No retries, no
//! silent fallback to another provider: substitution would hide provider
//! identity from the caller and make usage accounting misleading.

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::types::ProviderKind;

/// Routing state derived once from configuration at startup.
#[derive(Debug, Clone)]
pub struct ProviderRouter {
    default_provider: ProviderKind,
    finetuned_configured: bool,
    general_configured: bool,
    local_loaded: bool,
}

impl ProviderRouter {
    pub fn new(config: &GatewayConfig, local_loaded: bool) -> Self {
        Self {
            default_provider: config.default_provider,
            finetuned_configured: config.hf_endpoint.is_some(),
            general_configured: config.openai_api_key.is_some(),
            local_loaded,
        }
    }

    /// Resolve the backend for one request: explicit hint first, configured
    /// default otherwise.
    pub fn resolve(&self, hint: Option<&str>) -> Result<ProviderKind> {
        match hint {
            Some(raw) => raw.parse(),
            None => Ok(self.default_provider),
        }
    }

    /// Enforce availability preconditions for the selected provider, naming
    /// the missing configuration so operators can tell "bad request" from
    /// "bad deployment".
    pub fn ensure_available(&self, kind: ProviderKind) -> Result<()> {
        match kind {
            ProviderKind::Finetuned if !self.finetuned_configured => {
                Err(GatewayError::configuration(
                    "fine-tuned provider selected but HF_INFERENCE_URL is not set",
                ))
            }
            ProviderKind::General if !self.general_configured => {
                Err(GatewayError::configuration(
                    "general provider selected but OPENAI_API_KEY is not set",
                ))
            }
            ProviderKind::LocalOnnx if !self.local_loaded => {
                Err(GatewayError::configuration(
                    "local provider selected but no model is loaded (set ONNX_DIR)",
                ))
            }
            _ => Ok(()),
        }
    }

    pub fn default_provider(&self) -> ProviderKind {
        self.default_provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router_with(default_provider: ProviderKind) -> ProviderRouter {
        ProviderRouter {
            default_provider,
            finetuned_configured: true,
            general_configured: true,
            local_loaded: true,
        }
    }

    #[test]
    fn test_no_hint_selects_configured_default() {
        let router = router_with(ProviderKind::Finetuned);
        assert_eq!(router.resolve(None).unwrap(), ProviderKind::Finetuned);

        let router = router_with(ProviderKind::General);
        assert_eq!(router.resolve(None).unwrap(), ProviderKind::General);
    }

    #[test]
    fn test_hint_overrides_default() {
        let router = router_with(ProviderKind::Finetuned);
        assert_eq!(
            router.resolve(Some("openai")).unwrap(),
            ProviderKind::General
        );
        assert_eq!(
            router.resolve(Some("local")).unwrap(),
            ProviderKind::LocalOnnx
        );
    }

    #[test]
    fn test_unrecognized_hint_is_client_error() {
        let router = router_with(ProviderKind::Finetuned);
        let err = router.resolve(Some("mistral")).unwrap_err();
        assert!(matches!(err, GatewayError::ClientRequest(_)));
    }

    #[test]
    fn test_missing_endpoint_is_configuration_error() {
        let router = ProviderRouter {
            default_provider: ProviderKind::Finetuned,
            finetuned_configured: false,
            general_configured: false,
            local_loaded: false,
        };
        for kind in [
            ProviderKind::Finetuned,
            ProviderKind::General,
            ProviderKind::LocalOnnx,
        ] {
            let err = router.ensure_available(kind).unwrap_err();
            assert!(matches!(err, GatewayError::Configuration(_)));
        }
    }

    #[test]
    fn test_configured_providers_are_available() {
        let router = router_with(ProviderKind::Finetuned);
        for kind in [
            ProviderKind::Finetuned,
            ProviderKind::General,
            ProviderKind::LocalOnnx,
        ] {
            assert!(router.ensure_available(kind).is_ok());
        }
    }
}
