use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::anthropic::AnthropicClient;
use crate::gemini::GeminiClient;
use crate::huggingface::HuggingFaceClient;
use crate::openai::OpenAiCompatibleClient;
use crate::provider::ProviderClient;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// The closed set of supported vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Groq,
    OpenRouter,
    Anthropic,
    Gemini,
    HuggingFace,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Groq,
        ProviderKind::Gemini,
        ProviderKind::OpenRouter,
        ProviderKind::HuggingFace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Groq => "groq",
            Self::OpenRouter => "openrouter",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::HuggingFace => "huggingface",
        }
    }

    /// Accepts the canonical name case-insensitively, with or without `_`/`-`
    /// separators (`open_ai`, `hugging-face`), plus a few aliases.
    pub fn parse(s: &str) -> Option<Self> {
        let name: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match name.as_str() {
            "openai" => Some(Self::OpenAi),
            "groq" => Some(Self::Groq),
            "openrouter" => Some(Self::OpenRouter),
            "anthropic" | "claude" => Some(Self::Anthropic),
            "gemini" | "google" => Some(Self::Gemini),
            "huggingface" | "hf" => Some(Self::HuggingFace),
            _ => None,
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Groq => "GROQ_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
            Self::HuggingFace => "HUGGINGFACE_API_KEY",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Self::HuggingFace => "https://router.huggingface.co/hf-inference/models",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Groq => "llama-3.1-70b-versatile",
            Self::OpenRouter => "openai/gpt-4o-mini",
            Self::Anthropic => "claude-3-5-sonnet-20241022",
            Self::Gemini => "gemini-1.5-flash",
            Self::HuggingFace => "mistralai/Mistral-7B-Instruct-v0.3",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            kind,
            api_key: api_key.into(),
            model: kind.default_model().to_string(),
            base_url: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.kind.default_base_url())
            .trim_end_matches('/')
    }

    /// API key with everything but the last four characters hidden.
    pub fn masked_key(&self) -> String {
        let visible: String = self
            .api_key
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("****{}", visible)
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_key", &self.masked_key())
            .field("model", &self.model)
            .field("base_url", &self.base_url())
            .finish()
    }
}

/// Immutable provider list; its order is the failover priority.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    providers: Vec<ProviderConfig>,
    request_timeout: Duration,
}

impl ProviderSettings {
    pub fn new(providers: Vec<ProviderConfig>) -> Self {
        Self {
            providers,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn providers(&self) -> &[ProviderConfig] {
        &self.providers
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Build one client per configured provider, sharing a single HTTP pool.
    pub fn build_clients(&self) -> std::result::Result<Vec<ProviderClient>, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()?;

        Ok(self
            .providers
            .iter()
            .map(|config| match config.kind {
                ProviderKind::OpenAi | ProviderKind::Groq | ProviderKind::OpenRouter => {
                    ProviderClient::OpenAiCompatible(OpenAiCompatibleClient::new(
                        http.clone(),
                        config.clone(),
                    ))
                }
                ProviderKind::Anthropic => {
                    ProviderClient::Anthropic(AnthropicClient::new(http.clone(), config.clone()))
                }
                ProviderKind::Gemini => {
                    ProviderClient::Gemini(GeminiClient::new(http.clone(), config.clone()))
                }
                ProviderKind::HuggingFace => ProviderClient::HuggingFace(HuggingFaceClient::new(
                    http.clone(),
                    config.clone(),
                )),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip_names() {
        for kind in ProviderKind::ALL {
            assert_eq!(ProviderKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ProviderKind::parse(" Claude "), Some(ProviderKind::Anthropic));
        assert_eq!(ProviderKind::parse("cohere"), None);
    }

    #[test]
    fn test_serde_and_parse_agree() {
        for kind in ProviderKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
            let back: ProviderKind = serde_json::from_value(json).unwrap();
            assert_eq!(back, kind);
        }
        assert_eq!(ProviderKind::parse("open_ai"), Some(ProviderKind::OpenAi));
        assert_eq!(ProviderKind::parse("Open-Router"), Some(ProviderKind::OpenRouter));
        assert_eq!(ProviderKind::parse("hugging_face"), Some(ProviderKind::HuggingFace));
    }

    #[test]
    fn test_config_defaults() {
        let config = ProviderConfig::new(ProviderKind::Groq, "gsk_123456");
        assert_eq!(config.model, "llama-3.1-70b-versatile");
        assert_eq!(config.base_url(), "https://api.groq.com/openai/v1");

        let config = config.with_base_url("http://localhost:9000/v1/");
        assert_eq!(config.base_url(), "http://localhost:9000/v1");
    }

    #[test]
    fn test_debug_masks_key() {
        let config = ProviderConfig::new(ProviderKind::OpenAi, "sk-secretvalue-abcd");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("secretvalue"));
        assert!(rendered.contains("****abcd"));
    }

    #[test]
    fn test_build_clients_preserves_order() {
        let settings = ProviderSettings::new(vec![
            ProviderConfig::new(ProviderKind::HuggingFace, "hf"),
            ProviderConfig::new(ProviderKind::OpenAi, "sk"),
            ProviderConfig::new(ProviderKind::Anthropic, "ant"),
        ]);

        let clients = settings.build_clients().unwrap();
        let names: Vec<_> = clients.iter().map(|c| c.kind()).collect();
        assert_eq!(
            names,
            vec![
                ProviderKind::HuggingFace,
                ProviderKind::OpenAi,
                ProviderKind::Anthropic
            ]
        );
    }
}
