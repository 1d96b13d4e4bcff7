//! Pluggable completion clients.
//!
//! The crew only ever needs one operation from a model provider: turn a
//! system prompt plus a user prompt into text. Everything provider-specific
//! stays behind [`LlmClient`]; [`build_client`] picks the implementation from
//! the configuration.

mod providers;

#[cfg(feature = "bedrock")]
mod bedrock;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use compass_core::config::{LlmConfig, LlmProvider};
use thiserror::Error;

pub use providers::{AnthropicClient, OllamaClient, OpenAiClient};

#[cfg(feature = "bedrock")]
pub use bedrock::BedrockClient;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("provider returned an unexpected response: {0}")]
    InvalidResponse(String),
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    #[error("request timed out after {0} seconds")]
    Timeout(u64),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Api { status, .. } => *status == 429 || (500..=599).contains(status),
            Self::InvalidResponse(_) | Self::MissingCredentials(_) => false,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;

    fn name(&self) -> &str;
}

/// Construct the configured provider.
///
/// Fails fast on missing credentials rather than at first completion; the
/// health endpoint and `compass doctor` both lean on that.
pub async fn build_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    match config.provider {
        LlmProvider::OpenAi => Ok(Arc::new(OpenAiClient::new(config)?)),
        LlmProvider::Anthropic => Ok(Arc::new(AnthropicClient::new(config)?)),
        LlmProvider::Ollama => Ok(Arc::new(OllamaClient::new(config)?)),
        LlmProvider::Mock => Ok(Arc::new(ScriptedClient::default())),
        #[cfg(feature = "bedrock")]
        LlmProvider::Bedrock => Ok(Arc::new(BedrockClient::connect(config).await?)),
        #[cfg(not(feature = "bedrock"))]
        LlmProvider::Bedrock => Err(LlmError::MissingCredentials(
            "bedrock support is not compiled in (enable the `bedrock` feature)".to_string(),
        )),
    }
}

/// Retry wrapper around [`LlmClient::complete`].
///
/// Retries only errors [`LlmError::is_retryable`] admits, doubling the delay
/// between attempts.
pub async fn complete_with_retry(
    client: &dyn LlmClient,
    request: &CompletionRequest,
    max_retries: u32,
) -> Result<String, LlmError> {
    let mut delay = Duration::from_millis(500);
    let mut attempt = 0u32;

    loop {
        match client.complete(request).await {
            Ok(text) => return Ok(text),
            Err(error) if error.is_retryable() && attempt < max_retries => {
                attempt += 1;
                tracing::warn!(
                    event_name = "llm.complete.retry",
                    provider = client.name(),
                    attempt,
                    error = %error,
                    "completion failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(error) => return Err(error),
        }
    }
}

/// Deterministic client backing the `mock` provider.
///
/// Pops scripted responses in order and falls back to a canned line echoing
/// the prompt, which keeps credential-less demos and tests predictable.
#[derive(Default)]
pub struct ScriptedClient {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedClient {
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self { responses: Mutex::new(responses.into()) }
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let scripted = self
            .responses
            .lock()
            .map_err(|_| LlmError::InvalidResponse("scripted responses poisoned".to_string()))?
            .pop_front();

        Ok(scripted.unwrap_or_else(|| {
            let prompt = request.user.lines().next().unwrap_or_default();
            format!("[mock completion] {prompt}")
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
