pub mod collect;
pub mod providers;
pub mod retry;
pub mod streaming;

use std::sync::Arc;

use switchyard_core::config::{AppConfig, ModelConfig};
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::LlmClient;

pub use collect::{collect_completion, Completion, InvalidToolInput};
pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an LLM client for the configured provider.
pub fn create_client(config: &ModelConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider.as_str() {
        "openai" | "azure-openai" | "ollama" | "groq" | "openrouter" | "vllm" | "compatible" => {
            Ok(Box::new(OpenAiClient::new()))
        }
        other => Err(SwitchyardError::UnsupportedProvider(other.to_string())),
    }
}

/// Build the shared client for a run: the primary model, wrapped with retry
/// and fallbacks when configured.
pub fn build_client(config: &AppConfig) -> Result<Arc<dyn LlmClient>> {
    let primary = create_client(&config.model)?;

    if config.model.retry.is_none() && config.fallback_models.is_empty() {
        return Ok(Arc::from(primary));
    }

    let fallbacks = config
        .fallback_models
        .iter()
        .map(|fb| Ok((fb.clone(), create_client(fb)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(Arc::new(RetryingClient::new(
        primary,
        fallbacks,
        config.model.retry.clone().unwrap_or_default(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_is_rejected() {
        let mut config = ModelConfig::new("claude");
        config.provider = "carrier-pigeon".into();
        let err = create_client(&config).err().map(|e| e.to_string());
        assert_eq!(
            err.as_deref(),
            Some("LLM provider not supported: carrier-pigeon")
        );
    }

    #[test]
    fn test_build_client_with_fallbacks() {
        let mut config = AppConfig::with_model(ModelConfig::new("gpt-5"));
        config.fallback_models.push(ModelConfig::new("gpt-4.1-mini"));
        assert!(build_client(&config).is_ok());
    }
}
