//! Text generation backends that translate questions into expressions

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use thiserror::Error;

use crate::config::LlmConfig;

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("Translation backend unavailable: {0}")]
    Unavailable(String),

    #[error("OpenAI API error: {0}")]
    Api(#[from] async_openai::error::OpenAIError),

    #[error("Empty response from model")]
    EmptyResponse,
}

/// A single translation request
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationRequest {
    pub system_prompt: String,
    pub user_query: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl TranslationRequest {
    pub fn new(system_prompt: impl Into<String>, user_query: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_query: user_query.into(),
            temperature: 0.3,
            max_tokens: 150,
        }
    }
}

/// Anything that turns a prompt and a question into free text
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn translate(&self, request: &TranslationRequest) -> Result<String, TranslationError>;
}

/// Chat-completions backend for OpenAI-compatible APIs
pub struct OpenAiTranslator {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiTranslator {
    pub fn new(api_key: impl Into<String>, config: &LlmConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = &config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl TranslationProvider for OpenAiTranslator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn translate(&self, request: &TranslationRequest) -> Result<String, TranslationError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(request.system_prompt.clone())
                    .build()?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(request.user_query.clone())
                    .build()?,
            ),
        ];

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(messages)
            .temperature(request.temperature)
            .max_completion_tokens(request.max_tokens)
            .build()?;

        let response = self.client.chat().create(chat_request).await?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(TranslationError::EmptyResponse)?;

        tracing::info!(model = %self.model, "Generated code: {}", content);
        Ok(content)
    }
}
