use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse, ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use tracing::debug;

use super::{get_relevance_schema, LanguageModel, ScoreResult};
use crate::error::AppError;

const RELEVANCE_SYSTEM_MESSAGE: &str = "You judge how relevant a document is to a search query. \
Use only the document title and keywords. Respond with a score between 0 and 1, the keywords \
that matched the query, and a one sentence reasoning.";

const COMPLETION_SYSTEM_MESSAGE: &str =
    "You are a careful writing assistant for a personal knowledge base.";

/// `LanguageModel` backed by the OpenAI chat completions API.
pub struct OpenAiLanguageModel {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
    temperature: f32,
}

impl OpenAiLanguageModel {
    pub fn new(
        client: Arc<Client<OpenAIConfig>>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
        }
    }

    fn relevance_request(&self, prompt: &str) -> Result<CreateChatCompletionRequest, AppError> {
        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some("Relevance of a document to a query".into()),
                name: "relevance_score".into(),
                schema: Some(get_relevance_schema()),
                strict: Some(true),
            },
        };

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .messages([
                ChatCompletionRequestSystemMessage::from(RELEVANCE_SYSTEM_MESSAGE).into(),
                ChatCompletionRequestUserMessage::from(prompt.to_owned()).into(),
            ])
            .response_format(response_format)
            .build()?;

        Ok(request)
    }

    fn completion_request(&self, prompt: &str) -> Result<CreateChatCompletionRequest, AppError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .messages([
                ChatCompletionRequestSystemMessage::from(COMPLETION_SYSTEM_MESSAGE).into(),
                ChatCompletionRequestUserMessage::from(prompt.to_owned()).into(),
            ])
            .build()?;

        Ok(request)
    }

    async fn send(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<CreateChatCompletionResponse, AppError> {
        Ok(self.client.chat().create(request).await?)
    }
}

fn first_content(response: &CreateChatCompletionResponse) -> Result<&str, AppError> {
    response
        .choices
        .first()
        .and_then(|choice| choice.message.content.as_deref())
        .ok_or(AppError::LLMParsing(
            "No content found in LLM response".into(),
        ))
}

#[async_trait]
impl LanguageModel for OpenAiLanguageModel {
    async fn score_relevance(&self, prompt: &str) -> Result<ScoreResult, AppError> {
        let request = self.relevance_request(prompt)?;
        let response = self.send(request).await?;
        let content = first_content(&response)?;
        debug!(model = %self.model, "received relevance judgement");

        ScoreResult::from_json(content)
    }

    async fn complete_text(&self, prompt: &str) -> Result<String, AppError> {
        let request = self.completion_request(prompt)?;
        let response = self.send(request).await?;

        first_content(&response).map(|content| content.trim().to_string())
    }
}
