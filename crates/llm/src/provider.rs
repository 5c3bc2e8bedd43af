use async_trait::async_trait;
use reqwest::Response;
use tracing::warn;

use crate::anthropic::AnthropicClient;
use crate::config::ProviderKind;
use crate::error::ProviderError;
use crate::gemini::GeminiClient;
use crate::huggingface::HuggingFaceClient;
use crate::openai::OpenAiCompatibleClient;
use crate::request::GenerationRequest;
use crate::types::ApiErrorBody;

/// Capability shared by every LLM vendor: turn a prompt into text.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError>;
}

/// Concrete provider selected from configuration.
#[derive(Clone)]
pub enum ProviderClient {
    OpenAiCompatible(OpenAiCompatibleClient),
    Anthropic(AnthropicClient),
    Gemini(GeminiClient),
    HuggingFace(HuggingFaceClient),
}

impl ProviderClient {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::OpenAiCompatible(client) => client.kind(),
            Self::Anthropic(_) => ProviderKind::Anthropic,
            Self::Gemini(_) => ProviderKind::Gemini,
            Self::HuggingFace(_) => ProviderKind::HuggingFace,
        }
    }
}

#[async_trait]
impl ChatProvider for ProviderClient {
    fn name(&self) -> &str {
        self.kind().as_str()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let text = match self {
            Self::OpenAiCompatible(client) => client.generate(request).await?,
            Self::Anthropic(client) => client.generate(request).await?,
            Self::Gemini(client) => client.generate(request).await?,
            Self::HuggingFace(client) => client.generate(request).await?,
        };

        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(text)
    }
}

/// Pass successful responses through; turn anything else into a `ProviderError`.
pub(crate) async fn check_status(
    provider: &str,
    response: Response,
) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        warn!(provider, "Rate limited");
        return Err(ProviderError::RateLimited { retry_after });
    }

    let error_text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ApiErrorBody>(&error_text) {
        Ok(body) => body.error.message().to_string(),
        Err(_) => error_text,
    };

    Err(ProviderError::Api {
        status: status.as_u16(),
        message,
    })
}
