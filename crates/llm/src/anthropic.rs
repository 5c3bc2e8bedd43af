use reqwest::Client;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::provider::check_status;
use crate::request::GenerationRequest;
use crate::types::{AnthropicRequest, AnthropicResponse, ChatMessage};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for the Anthropic Messages API; the system prompt travels outside `messages`.
#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    config: ProviderConfig,
}

impl AnthropicClient {
    pub fn new(client: Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        debug!(
            model = %self.config.model,
            kind = request.kind.as_str(),
            "Creating Anthropic message"
        );

        let body = AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system.clone(),
            messages: vec![ChatMessage::user(request.prompt.clone())],
        };

        let response = self
            .client
            .post(format!("{}/messages", self.config.base_url()))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;
        let response = check_status("anthropic", response).await?;

        let message: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let text: String = message
            .content
            .into_iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            Err(ProviderError::EmptyResponse)
        } else {
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use crate::request::OutputKind;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_messages_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "ant-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({
                "system": "be precise",
                "messages": [{"role": "user", "content": "describe"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    {"type": "text", "text": "part one, "},
                    {"type": "text", "text": "part two"}
                ],
                "stop_reason": "end_turn"
            })))
            .mount(&server)
            .await;

        let config = ProviderConfig::new(ProviderKind::Anthropic, "ant-key")
            .with_base_url(format!("{}/v1", server.uri()));
        let client = AnthropicClient::new(Client::new(), config);
        let request =
            GenerationRequest::new(OutputKind::Readme, "describe").with_system("be precise");

        assert_eq!(
            client.generate(&request).await.unwrap(),
            "part one, part two"
        );
    }
}
