pub mod providers;

use std::sync::Arc;

use tenderflow_core::config::ModelConfig;
use tenderflow_core::traits::TextCompletion;

pub use providers::anthropic::AnthropicClient;
pub use providers::openai::OpenAiClient;

/// Create a completion client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Arc<dyn TextCompletion> {
    match config.provider.as_str() {
        "anthropic" | "claude" => Arc::new(AnthropicClient::new(config.clone())),
        // Everything else uses the OpenAI-compatible client
        _ => Arc::new(OpenAiClient::new(config.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_client_dispatches_on_provider() {
        let mut config = ModelConfig {
            provider: "anthropic".into(),
            model_id: "claude-3-5-sonnet-latest".into(),
            ..Default::default()
        };
        assert_eq!(create_client(&config).model_id(), "claude-3-5-sonnet-latest");

        config.provider = "ollama".into();
        config.model_id = "llama3".into();
        assert_eq!(create_client(&config).model_id(), "llama3");
    }
}
