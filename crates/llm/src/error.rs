use thiserror::Error;

/// Failure of a single provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited")]
    RateLimited { retry_after: Option<u64> },

    #[error("Provider returned no completion")]
    EmptyResponse,

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

/// One provider's error inside an aggregate failure.
#[derive(Debug)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: ProviderError,
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("No LLM providers configured")]
    NoProviders,

    #[error("All {} providers failed: {}", .failures.len(), join_failures(.failures))]
    AllProvidersFailed { failures: Vec<ProviderFailure> },
}

impl LlmError {
    /// Names of the providers that failed, in the order they were tried.
    pub fn failed_providers(&self) -> Vec<&str> {
        match self {
            LlmError::NoProviders => Vec::new(),
            LlmError::AllProvidersFailed { failures } => {
                failures.iter().map(|f| f.provider.as_str()).collect()
            }
        }
    }
}

fn join_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, LlmError>;
