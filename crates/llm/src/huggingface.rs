use reqwest::Client;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::provider::check_status;
use crate::request::GenerationRequest;
use crate::types::{HuggingFaceGeneration, HuggingFaceOptions, HuggingFaceParameters, HuggingFaceRequest};

/// Client for the HuggingFace text-generation inference endpoint.
///
/// The endpoint takes a single prompt string, so a system prompt is
/// prepended to the user prompt.
#[derive(Clone)]
pub struct HuggingFaceClient {
    client: Client,
    config: ProviderConfig,
}

impl HuggingFaceClient {
    pub fn new(client: Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        debug!(
            model = %self.config.model,
            kind = request.kind.as_str(),
            "Creating HuggingFace generation"
        );

        let inputs = match &request.system {
            Some(system) => format!("{}\n\n{}", system, request.prompt),
            None => request.prompt.clone(),
        };

        let body = HuggingFaceRequest {
            inputs,
            parameters: HuggingFaceParameters {
                max_new_tokens: request.max_tokens,
                temperature: request.temperature,
                do_sample: true,
                return_full_text: false,
            },
            options: HuggingFaceOptions {
                wait_for_model: true,
            },
        };

        let response = self
            .client
            .post(format!("{}/{}", self.config.base_url(), self.config.model))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;
        let response = check_status("huggingface", response).await?;

        let generations: Vec<HuggingFaceGeneration> = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        generations
            .into_iter()
            .next()
            .map(|g| g.generated_text)
            .ok_or(ProviderError::EmptyResponse)
    }
}
