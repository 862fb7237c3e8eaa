//! Model transport implementations for workagent.
//!
//! All providers implement the `workagent_core::Provider` trait. The only
//! wire format shipped is OpenAI-compatible chat completions.

pub mod openai_compat;

use std::sync::Arc;

use workagent_config::AppConfig;
use workagent_core::error::ProviderError;
use workagent_core::provider::Provider;

pub use openai_compat::OpenAiCompatProvider;

/// Build the configured provider.
///
/// `openai` covers every OpenAI-compatible endpoint through `base_url`;
/// `ollama` is the same transport without an API key requirement.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let provider = match config.provider.as_str() {
        "openai" | "openai-compatible" => {
            let api_key = config
                .require_api_key()
                .map_err(|e| ProviderError::NotConfigured(e.to_string()))?;
            OpenAiCompatProvider::new(config.provider.clone(), &config.base_url, api_key)?
        }
        "ollama" => {
            // The hosted default makes no sense for a local server
            let base_url = (!config.base_url.contains("api.openai.com"))
                .then_some(config.base_url.as_str());
            OpenAiCompatProvider::ollama(base_url)?
        }
        other => {
            return Err(ProviderError::NotConfigured(format!(
                "unknown provider '{other}' (expected openai, openai-compatible or ollama)"
            )));
        }
    };

    tracing::debug!(provider = %provider.name(), base_url = %provider.base_url(), "Provider configured");
    Ok(Arc::new(provider))
}
