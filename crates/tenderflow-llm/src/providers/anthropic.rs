use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tenderflow_core::config::ModelConfig;
use tenderflow_core::error::{Result, TenderError};
use tenderflow_core::traits::TextCompletion;
use tenderflow_core::types::{ChatMessage, Completion, Role};

use super::status_error;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API client bound to one model identity.
pub struct AnthropicClient {
    http: Client,
    config: ModelConfig,
}

impl AnthropicClient {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

// Anthropic API request types
#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Serialize, Debug, PartialEq)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

// Anthropic API response types
#[derive(Deserialize, Debug)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct UsageInfo {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Split out system messages; Anthropic takes them as a top-level field.
fn convert_messages(messages: Vec<ChatMessage>) -> (Option<String>, Vec<ApiMessage>) {
    let mut system: Option<String> = None;
    let mut api_msgs = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                system = Some(match system {
                    Some(prev) => format!("{}\n\n{}", prev, msg.content),
                    None => msg.content,
                });
            }
            Role::User => api_msgs.push(ApiMessage {
                role: "user",
                content: msg.content,
            }),
            Role::Assistant => api_msgs.push(ApiMessage {
                role: "assistant",
                content: msg.content,
            }),
        }
    }

    (system, api_msgs)
}

fn parse_response(body: &str, fallback_model: &str) -> Result<Completion> {
    let parsed: AnthropicResponse = serde_json::from_str(body)
        .map_err(|e| TenderError::LlmParse(format!("invalid Anthropic response: {}", e)))?;

    if let Some(usage) = &parsed.usage {
        debug!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Token usage"
        );
    }

    let text: String = parsed
        .content
        .iter()
        .filter_map(|b| match b {
            ResponseBlock::Text { text } => Some(text.as_str()),
            ResponseBlock::Other => None,
        })
        .collect();

    if text.trim().is_empty() {
        return Err(TenderError::LlmParse(
            "Anthropic response contained no text".into(),
        ));
    }

    Ok(Completion::new(
        text,
        parsed.model.unwrap_or_else(|| fallback_model.to_string()),
    ))
}

impl TextCompletion for AnthropicClient {
    fn model_id(&self) -> &str {
        &self.config.model_id
    }

    fn complete(&self, messages: Vec<ChatMessage>) -> BoxFuture<'_, Result<Completion>> {
        Box::pin(async move {
            let api_key = self
                .config
                .api_key
                .as_deref()
                .ok_or_else(|| TenderError::Config("Anthropic API key not set".into()))?;

            let base_url = self
                .config
                .base_url
                .as_deref()
                .unwrap_or(ANTHROPIC_API_URL);

            let (system, api_messages) = convert_messages(messages);

            let body = AnthropicRequest {
                model: self.config.model_id.clone(),
                max_tokens: self.config.max_tokens,
                temperature: Some(self.config.temperature),
                messages: api_messages,
                system,
            };

            let response = self
                .http
                .post(base_url)
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(|e| TenderError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                return Err(status_error(response).await);
            }

            let text = response
                .text()
                .await
                .map_err(|e| TenderError::LlmRequest(e.to_string()))?;
            parse_response(&text, &self.config.model_id)
        })
    }
}
