//! LLM provider clients with ordered failover.
//!
//! Every vendor is reached through [`ChatProvider`]. [`FailoverClient`] walks
//! the configured providers in priority order for each request and returns
//! the first successful completion.

mod anthropic;
mod config;
mod error;
mod failover;
mod gemini;
mod huggingface;
mod openai;
mod provider;
mod request;
pub mod types;

pub use anthropic::AnthropicClient;
pub use config::{ProviderConfig, ProviderKind, ProviderSettings};
pub use error::{LlmError, ProviderError, ProviderFailure, Result};
pub use failover::FailoverClient;
pub use gemini::GeminiClient;
pub use huggingface::HuggingFaceClient;
pub use openai::OpenAiCompatibleClient;
pub use provider::{ChatProvider, ProviderClient};
pub use request::{GenerationRequest, GenerationResponse, OutputKind};
