//! AWS Bedrock provider via the Converse API.
//!
//! Compiled only with the `bedrock` cargo feature; credentials come from the
//! standard AWS credential chain (environment, profile, instance role).

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_bedrockruntime::types::{
    ContentBlock, ConversationRole, InferenceConfiguration, Message, SystemContentBlock,
};
use compass_core::config::LlmConfig;

use super::{CompletionRequest, LlmClient, LlmError};

pub struct BedrockClient {
    client: aws_sdk_bedrockruntime::Client,
    model: String,
    max_tokens: u32,
}

impl BedrockClient {
    pub async fn connect(config: &LlmConfig) -> Result<Self, LlmError> {
        let region = config.region.clone().ok_or_else(|| {
            LlmError::MissingCredentials("the bedrock provider requires llm.region".to_string())
        })?;

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region));
        if let Some(profile) = &config.aws_profile {
            loader = loader.profile_name(profile);
        }
        let sdk_config = loader.load().await;

        Ok(Self {
            client: aws_sdk_bedrockruntime::Client::new(&sdk_config),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl LlmClient for BedrockClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let message = Message::builder()
            .role(ConversationRole::User)
            .content(ContentBlock::Text(request.user.clone()))
            .build()
            .map_err(|error| LlmError::InvalidResponse(error.to_string()))?;

        let inference = InferenceConfiguration::builder()
            .max_tokens(self.max_tokens.min(i32::MAX as u32) as i32)
            .build();

        let output = self
            .client
            .converse()
            .model_id(&self.model)
            .system(SystemContentBlock::Text(request.system.clone()))
            .messages(message)
            .inference_config(inference)
            .send()
            .await
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        let message = match output.output {
            Some(aws_sdk_bedrockruntime::types::ConverseOutput::Message(message)) => message,
            _ => {
                return Err(LlmError::InvalidResponse(
                    "converse response carried no message".to_string(),
                ))
            }
        };

        let text: Vec<String> = message
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text(text) => Some(text),
                _ => None,
            })
            .collect();

        if text.is_empty() {
            return Err(LlmError::InvalidResponse(
                "converse response carried no text blocks".to_string(),
            ));
        }

        Ok(text.join(""))
    }

    fn name(&self) -> &str {
        "bedrock"
    }
}
