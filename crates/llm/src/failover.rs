use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ProviderSettings;
use crate::error::{LlmError, ProviderFailure, Result};
use crate::provider::ChatProvider;
use crate::request::{GenerationRequest, GenerationResponse};

/// Ordered provider list with first-success semantics.
///
/// Each call starts again from the first provider. No provider is retried
/// within a call and nothing about earlier failures is remembered.
#[derive(Clone)]
pub struct FailoverClient {
    providers: Arc<[Arc<dyn ChatProvider>]>,
}

impl FailoverClient {
    pub fn new(providers: Vec<Arc<dyn ChatProvider>>) -> Self {
        Self {
            providers: providers.into(),
        }
    }

    pub fn from_settings(
        settings: &ProviderSettings,
    ) -> std::result::Result<Self, reqwest::Error> {
        let providers = settings
            .build_clients()?
            .into_iter()
            .map(|client| Arc::new(client) as Arc<dyn ChatProvider>)
            .collect();
        Ok(Self::new(providers))
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        if self.providers.is_empty() {
            return Err(LlmError::NoProviders);
        }

        let mut failures = Vec::new();

        for (position, provider) in self.providers.iter().enumerate() {
            debug!(
                provider = provider.name(),
                position,
                kind = request.kind.as_str(),
                "Trying provider"
            );

            match provider.generate(request).await {
                Ok(text) => {
                    if !failures.is_empty() {
                        info!(
                            provider = provider.name(),
                            failed = failures.len(),
                            "Generation succeeded after failover"
                        );
                    }
                    return Ok(GenerationResponse {
                        text,
                        provider: provider.name().to_string(),
                        kind: request.kind,
                    });
                }
                Err(error) => {
                    warn!(
                        provider = provider.name(),
                        position,
                        error = %error,
                        "Provider failed, trying next"
                    );
                    failures.push(ProviderFailure {
                        provider: provider.name().to_string(),
                        error,
                    });
                }
            }
        }

        Err(LlmError::AllProvidersFailed { failures })
    }
}

impl std::fmt::Debug for FailoverClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverClient")
            .field("providers", &self.provider_names())
            .finish()
    }
}
