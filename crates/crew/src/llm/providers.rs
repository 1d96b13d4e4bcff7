//! HTTP completion providers: OpenAI-compatible, Anthropic, and Ollama.

use std::time::Duration;

use async_trait::async_trait;
use compass_core::config::LlmConfig;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use super::{CompletionRequest, LlmClient, LlmError};

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_API_VERSION: &str = "2023-06-01";

fn http_client(timeout_secs: u64) -> Result<Client, LlmError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|error| LlmError::Transport(error.to_string()))
}

fn transport_error(error: reqwest::Error, timeout_secs: u64) -> LlmError {
    if error.is_timeout() {
        LlmError::Timeout(timeout_secs)
    } else {
        LlmError::Transport(error.to_string())
    }
}

fn api_error(status: StatusCode, body: &str) -> LlmError {
    // Provider error bodies are JSON with a nested message; surface the
    // message when present, the raw body otherwise.
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .or_else(|| value.pointer("/error"))
                .and_then(|message| message.as_str().map(ToString::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string());

    LlmError::Api { status: status.as_u16(), message }
}

fn required_api_key(config: &LlmConfig) -> Result<SecretString, LlmError> {
    config.api_key.clone().ok_or_else(|| {
        LlmError::MissingCredentials(format!(
            "provider `{}` requires llm.api_key",
            config.provider.as_str()
        ))
    })
}

fn trimmed_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// OpenAI chat-completions client, also used for OpenAI-compatible gateways
/// via `llm.base_url`.
pub struct OpenAiClient {
    http: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    max_tokens: u32,
    timeout_secs: u64,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            http: http_client(config.timeout_secs)?,
            api_key: required_api_key(config)?,
            base_url: trimmed_base_url(
                config.base_url.as_deref().unwrap_or(OPENAI_DEFAULT_BASE_URL),
            ),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
        });

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| transport_error(error, self.timeout_secs))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| transport_error(error, self.timeout_secs))?;

        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let parsed: OpenAiResponse = serde_json::from_str(&body)
            .map_err(|error| LlmError::InvalidResponse(error.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("response carried no choices".to_string()))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Anthropic Messages API client.
pub struct AnthropicClient {
    http: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    max_tokens: u32,
    timeout_secs: u64,
}

impl AnthropicClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            http: http_client(config.timeout_secs)?,
            api_key: required_api_key(config)?,
            base_url: trimmed_base_url(
                config.base_url.as_deref().unwrap_or(ANTHROPIC_DEFAULT_BASE_URL),
            ),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": request.system,
            "messages": [
                { "role": "user", "content": request.user },
            ],
        });

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|error| transport_error(error, self.timeout_secs))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| transport_error(error, self.timeout_secs))?;

        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let parsed: AnthropicResponse = serde_json::from_str(&body)
            .map_err(|error| LlmError::InvalidResponse(error.to_string()))?;

        let text: Vec<String> = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text),
                AnthropicContentBlock::Other => None,
            })
            .collect();

        if text.is_empty() {
            return Err(LlmError::InvalidResponse(
                "response carried no text content blocks".to_string(),
            ));
        }

        Ok(text.join(""))
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// Ollama chat client for local models.
pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = config.base_url.as_deref().ok_or_else(|| {
            LlmError::MissingCredentials("the ollama provider requires llm.base_url".to_string())
        })?;

        Ok(Self {
            http: http_client(config.timeout_secs)?,
            base_url: trimmed_base_url(base_url),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "stream": false,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
        });

        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|error| transport_error(error, self.timeout_secs))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| transport_error(error, self.timeout_secs))?;

        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let parsed: OllamaResponse = serde_json::from_str(&body)
            .map_err(|error| LlmError::InvalidResponse(error.to_string()))?;

        Ok(parsed.message.content)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use compass_core::config::{AppConfig, LlmProvider};
    use reqwest::StatusCode;

    use super::{api_error, AnthropicClient, OllamaClient, OpenAiClient};
    use crate::llm::LlmError;

    fn llm_config(provider: LlmProvider) -> compass_core::config::LlmConfig {
        let mut config = AppConfig::default().llm;
        config.provider = provider;
        config
    }

    #[test]
    fn api_error_extracts_nested_provider_messages() {
        let error = api_error(
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"invalid api key","type":"auth_error"}}"#,
        );

        match error {
            LlmError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid api key");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn api_error_falls_back_to_the_raw_body() {
        let error = api_error(StatusCode::BAD_GATEWAY, "upstream exploded");

        match error {
            LlmError::Api { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream exploded");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn openai_and_anthropic_require_an_api_key() {
        let mut config = llm_config(LlmProvider::OpenAi);
        config.api_key = None;
        assert!(matches!(
            OpenAiClient::new(&config),
            Err(LlmError::MissingCredentials(_))
        ));

        let mut config = llm_config(LlmProvider::Anthropic);
        config.api_key = None;
        assert!(matches!(
            AnthropicClient::new(&config),
            Err(LlmError::MissingCredentials(_))
        ));
    }

    #[test]
    fn ollama_requires_a_base_url() {
        let mut config = llm_config(LlmProvider::Ollama);
        config.base_url = None;

        assert!(matches!(OllamaClient::new(&config), Err(LlmError::MissingCredentials(_))));
    }
}
