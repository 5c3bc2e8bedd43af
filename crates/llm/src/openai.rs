use reqwest::Client;
use tracing::debug;

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::ProviderError;
use crate::provider::check_status;
use crate::request::GenerationRequest;
use crate::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};

/// Client for any `/chat/completions` endpoint speaking the OpenAI dialect.
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    client: Client,
    config: ProviderConfig,
}

impl OpenAiCompatibleClient {
    pub fn new(client: Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    pub fn kind(&self) -> ProviderKind {
        self.config.kind
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.push(ChatMessage::user(request.prompt.clone()));

        debug!(
            provider = %self.config.kind,
            model = %self.config.model,
            kind = request.kind.as_str(),
            "Creating chat completion"
        );

        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            stream: Some(false),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url()))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;
        let response = check_status(self.config.kind.as_str(), response).await?;

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ProviderError::EmptyResponse)
    }
}
