use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tenderflow_core::config::ModelConfig;
use tenderflow_core::error::{Result, TenderError};
use tenderflow_core::traits::TextCompletion;
use tenderflow_core::types::{ChatMessage, Completion, Role};

use super::status_error;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible client. Works with OpenAI, Ollama, vLLM, Groq, OpenRouter, etc.
pub struct OpenAiClient {
    http: Client,
    config: ModelConfig,
}

impl OpenAiClient {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize, Debug, PartialEq)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn convert_messages(messages: Vec<ChatMessage>) -> Vec<OaiMessage> {
    messages
        .into_iter()
        .map(|m| OaiMessage {
            role: match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: m.content,
        })
        .collect()
}

fn parse_response(body: &str, fallback_model: &str) -> Result<Completion> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| TenderError::LlmParse(format!("invalid chat completion response: {}", e)))?;

    if let Some(usage) = &parsed.usage {
        debug!(
            input_tokens = usage.prompt_tokens,
            output_tokens = usage.completion_tokens,
            "Token usage"
        );
    }

    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| TenderError::LlmParse("chat completion contained no content".into()))?;

    Ok(Completion::new(
        text,
        parsed.model.unwrap_or_else(|| fallback_model.to_string()),
    ))
}

impl TextCompletion for OpenAiClient {
    fn model_id(&self) -> &str {
        &self.config.model_id
    }

    fn complete(&self, messages: Vec<ChatMessage>) -> BoxFuture<'_, Result<Completion>> {
        Box::pin(async move {
            let base_url = self.config.base_url.as_deref().unwrap_or(OPENAI_API_URL);

            let body = ChatRequest {
                model: self.config.model_id.clone(),
                messages: convert_messages(messages),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            };

            let mut req = self
                .http
                .post(base_url)
                .header("content-type", "application/json")
                .json(&body);

            // Local servers (Ollama, vLLM) run without a key
            if let Some(key) = &self.config.api_key {
                req = req.bearer_auth(key);
            }

            let response = req
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_messages_keeps_order_and_roles() {
        let msgs = convert_messages(vec![
            ChatMessage::system("sys"),
            ChatMessage::user("question"),
        ]);
        assert_eq!(
            msgs,
            vec![
                OaiMessage { role: "system", content: "sys".into() },
                OaiMessage { role: "user", content: "question".into() },
            ]
        );
    }

    #[test]
    fn test_parse_response_first_choice() {
        let body = r#"{
            "model": "gpt-4o-2024-08-06",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "{\"query_intent\": \"x\"}"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5}
        }"#;
        let completion = parse_response(body, "fallback").unwrap();
        assert_eq!(completion.text, r#"{"query_intent": "x"}"#);
        assert_eq!(completion.model, "gpt-4o-2024-08-06");
    }

    #[test]
    fn test_parse_response_empty_choices() {
        let err = parse_response(r#"{"choices": []}"#, "m").unwrap_err();
        assert!(matches!(err, TenderError::LlmParse(_)));
    }

    #[test]
    fn test_parse_response_malformed_json() {
        assert!(matches!(
            parse_response("<html>bad gateway</html>", "m"),
            Err(TenderError::LlmParse(_))
        ));
    }
}
